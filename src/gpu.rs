// SPDX-License-Identifier: Apache-2.0

//! CUDA support for hwsed
//!
//! Compiled only when `build.rs` detects `nvcc` (`cfg(has_cuda)`). Provides:
//! - the lazily-initialised, process-lifetime device context behind an
//!   init-once guard
//! - a cache of JIT-loaded PTX modules keyed by kernel source hash
//! - [`launch_ptx`], the single kernel-launch entry point
//! - [`DeviceBuffer`], a scoped device allocation tied to one matcher call
//!
//! Every failure surfaces as [`HwsedError::BackendUnavailable`]; the dispatch
//! layer converts that into a host-matcher call.

use log::debug;
use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::marker::PhantomData;
use std::ptr;
use std::sync::Mutex;

use crate::types::{HwsedError, Result};

// CUDA runtime API declarations
#[cfg(has_cuda)]
unsafe extern "C" {
    fn cudaMalloc(ptr: *mut *mut c_void, size: usize) -> i32;
    fn cudaMemcpy(dst: *mut c_void, src: *const c_void, size: usize, kind: i32) -> i32;
    fn cudaFree(ptr: *mut c_void) -> i32;
    fn cudaMemset(ptr: *mut c_void, value: i32, size: usize) -> i32;
}

// CUDA driver API declarations for raw FFI
#[repr(C)]
struct CUmod_st {
    _opaque: u8,
}
type CUmodule = *mut CUmod_st;

#[repr(C)]
struct CUfunc_st {
    _opaque: u8,
}
type CUfunction = *mut CUfunc_st;

#[repr(C)]
struct CUctx_st {
    _opaque: u8,
}
type CUcontext = *mut CUctx_st;

#[repr(C)]
struct CUstream_st {
    _opaque: u8,
}
type CUstream = *mut CUstream_st;

// Wrappers to make CUDA pointers Send - the driver API is thread-safe
struct SendModule(CUmodule);
unsafe impl Send for SendModule {}
unsafe impl Sync for SendModule {}

struct SendContext(CUcontext);
unsafe impl Send for SendContext {}
unsafe impl Sync for SendContext {}

#[allow(non_camel_case_types)]
type CUresult = i32;

#[allow(non_camel_case_types)]
type CUjit_option = i32;

const CU_JIT_INFO_LOG_BUFFER: CUjit_option = 3;
const CU_JIT_INFO_LOG_BUFFER_SIZE_BYTES: CUjit_option = 4;
const CU_JIT_ERROR_LOG_BUFFER: CUjit_option = 5;
const CU_JIT_ERROR_LOG_BUFFER_SIZE_BYTES: CUjit_option = 6;

#[cfg(has_cuda)]
unsafe extern "C" {
    fn cuInit(flags: u32) -> CUresult;
    fn cuDeviceGet(device: *mut i32, ordinal: i32) -> CUresult;
    fn cuCtxCreate_v2(ctx: *mut CUcontext, flags: u32, dev: i32) -> CUresult;
    fn cuCtxSetCurrent(ctx: CUcontext) -> CUresult;
    fn cuModuleGetFunction(func: *mut CUfunction, module: CUmodule, name: *const i8) -> CUresult;
    fn cuLaunchKernel(
        f: CUfunction,
        grid_dim_x: u32,
        grid_dim_y: u32,
        grid_dim_z: u32,
        block_dim_x: u32,
        block_dim_y: u32,
        block_dim_z: u32,
        shared_mem_bytes: u32,
        stream: CUstream,
        kernel_params: *mut *mut c_void,
        extra: *mut *mut c_void,
    ) -> CUresult;
    fn cuStreamCreate(stream: *mut CUstream, flags: u32) -> CUresult;
    fn cuStreamSynchronize(stream: CUstream) -> CUresult;
    fn cuModuleLoadDataEx(
        module: *mut CUmodule,
        image: *const c_void,
        num_options: u32,
        options: *mut CUjit_option,
        option_values: *mut *mut c_void,
    ) -> CUresult;
}

// CUDA memory copy directions
const CUDA_MEMCPY_HOST_TO_DEVICE: i32 = 1;
const CUDA_MEMCPY_DEVICE_TO_HOST: i32 = 2;

// Global module cache and context - shared by repeated invocations
lazy_static::lazy_static! {
    static ref MODULE_CACHE: Mutex<HashMap<String, SendModule>> = Mutex::new(HashMap::new());
    static ref CUDA_INITIALIZED: Mutex<bool> = Mutex::new(false);
    static ref CUDA_CONTEXT: Mutex<Option<SendContext>> = Mutex::new(None);
}

// Thread-local stream so callers on different threads never share one
thread_local! {
    static THREAD_STREAM: std::cell::RefCell<Option<CUstream>> = const { std::cell::RefCell::new(None) };
}

#[inline]
fn backend_err(what: &str, code: CUresult) -> HwsedError {
    HwsedError::BackendUnavailable(format!("{} failed: {}", what, code))
}

/// Initialize CUDA once per process and make the shared context current for
/// the calling thread.
pub(crate) fn ensure_cuda_initialized() -> Result<()> {
    let mut initialized = CUDA_INITIALIZED.lock().unwrap();
    if !*initialized {
        unsafe {
            let result = cuInit(0);
            if result != 0 {
                debug!("HWSED GPU: cuInit failed code={}", result);
                return Err(backend_err("cuInit", result));
            }

            let mut device = 0;
            let result = cuDeviceGet(&mut device, 0);
            if result != 0 {
                debug!("HWSED GPU: cuDeviceGet failed code={}", result);
                return Err(backend_err("cuDeviceGet", result));
            }

            let mut ctx = ptr::null_mut();
            let result = cuCtxCreate_v2(&mut ctx, 0, device);
            if result != 0 {
                debug!("HWSED GPU: cuCtxCreate_v2 failed code={}", result);
                return Err(backend_err("cuCtxCreate", result));
            }

            let mut ctx_cache = CUDA_CONTEXT.lock().unwrap();
            *ctx_cache = Some(SendContext(ctx));
        }
        *initialized = true;
    }

    unsafe {
        if let Some(ref ctx) = *CUDA_CONTEXT.lock().unwrap() {
            let result = cuCtxSetCurrent(ctx.0);
            if result != 0 {
                debug!("HWSED GPU: cuCtxSetCurrent failed code={}", result);
                return Err(backend_err("cuCtxSetCurrent", result));
            }
        }
    }

    Ok(())
}

// Get or create a stream for this thread
fn get_thread_stream() -> Result<CUstream> {
    THREAD_STREAM.with(|stream_cell| {
        let mut stream_opt = stream_cell.borrow_mut();
        if stream_opt.is_none() {
            let mut stream = ptr::null_mut();
            unsafe {
                let result = cuStreamCreate(&mut stream, 0);
                if result != 0 {
                    return Err(backend_err("cuStreamCreate", result));
                }
            }
            *stream_opt = Some(stream);
        }
        Ok(stream_opt.unwrap())
    })
}

fn fnv1a(parts: &[&[u8]]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for part in parts {
        for &byte in &(part.len() as u64).to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        for &b in *part {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    }
    hash
}

/// JIT-load `ptx_code` (cached by content hash) and launch `kernel_name`
/// with the given grid, blocking until the stream drains.
///
/// `args` holds pointers to the parameter values, one per kernel parameter.
pub(crate) fn launch_ptx(
    ptx_code: &'static str,
    kernel_name: &str,
    blocks: u32,
    threads: u32,
    args: &[*const u8],
) -> Result<()> {
    debug!(
        "HWSED GPU: launch_ptx kernel={} blocks={} threads={}",
        kernel_name, blocks, threads
    );
    ensure_cuda_initialized()?;

    let module = {
        let key = format!("ptx:{:016x}", fnv1a(&[ptx_code.as_bytes()]));
        let mut cache = MODULE_CACHE.lock().unwrap();

        if let Some(module) = cache.get(&key) {
            debug!("HWSED GPU: module cache hit {}", key);
            module.0
        } else {
            // Keep logs alive for the whole JIT scope
            let mut error_log: Vec<i8> = vec![0; 8192];
            let mut info_log: Vec<i8> = vec![0; 8192];
            let mut options: [CUjit_option; 4] = [
                CU_JIT_ERROR_LOG_BUFFER,
                CU_JIT_ERROR_LOG_BUFFER_SIZE_BYTES,
                CU_JIT_INFO_LOG_BUFFER,
                CU_JIT_INFO_LOG_BUFFER_SIZE_BYTES,
            ];
            let mut option_values: [*mut c_void; 4] = [
                error_log.as_mut_ptr() as *mut c_void,
                (error_log.len()) as *mut c_void,
                info_log.as_mut_ptr() as *mut c_void,
                (info_log.len()) as *mut c_void,
            ];

            let mut module = ptr::null_mut();
            let ptx_cstring = CString::new(ptx_code)
                .map_err(|e| HwsedError::BackendUnavailable(format!("invalid PTX: {}", e)))?;
            unsafe {
                debug!("HWSED GPU: cuModuleLoadDataEx ({} bytes)", ptx_code.len());
                let result = cuModuleLoadDataEx(
                    &mut module,
                    ptx_cstring.as_ptr() as *const c_void,
                    options.len() as u32,
                    options.as_mut_ptr(),
                    option_values.as_mut_ptr(),
                );
                if result != 0 {
                    let len = error_log
                        .iter()
                        .position(|&c| c == 0)
                        .unwrap_or(error_log.len());
                    let err = {
                        let ptr = error_log.as_ptr() as *const u8;
                        let slice = std::slice::from_raw_parts(ptr, len);
                        String::from_utf8_lossy(slice).to_string()
                    };
                    debug!(
                        "HWSED GPU: cuModuleLoadDataEx failed (result={}) | error_log=\"{}\"",
                        result, err
                    );
                    return Err(HwsedError::BackendUnavailable(format!(
                        "cuModuleLoadDataEx failed: {} | {}",
                        result, err
                    )));
                }
            }

            cache.insert(key, SendModule(module));
            module
        }
    };

    let kernel_cstring = CString::new(kernel_name)
        .map_err(|e| HwsedError::BackendUnavailable(format!("invalid kernel name: {}", e)))?;

    let mut function = ptr::null_mut();
    unsafe {
        let result = cuModuleGetFunction(&mut function, module, kernel_cstring.as_ptr());
        if result != 0 {
            return Err(backend_err("cuModuleGetFunction", result));
        }
    }

    let stream = get_thread_stream()?;

    unsafe {
        let mut kernel_params: Vec<*mut c_void> =
            args.iter().map(|&arg| arg as *mut c_void).collect();

        let result = cuLaunchKernel(
            function,
            blocks,
            1,
            1,
            threads,
            1,
            1,
            0,
            stream,
            kernel_params.as_mut_ptr(),
            ptr::null_mut(),
        );
        if result != 0 {
            return Err(backend_err("cuLaunchKernel", result));
        }

        // The fence: one dispatch at a time, re-ordered host-side afterwards.
        debug!("HWSED GPU: cuStreamSynchronize");
        let result = cuStreamSynchronize(stream);
        if result != 0 {
            return Err(backend_err("cuStreamSynchronize", result));
        }
    }

    Ok(())
}

// =============================================================================
// SCOPED DEVICE BUFFERS
// =============================================================================

/// A device allocation whose lifetime is scoped to one matcher call; freed on
/// drop. `T` must be plain-old-data.
pub(crate) struct DeviceBuffer<T: Copy> {
    ptr: *mut c_void,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Copy> DeviceBuffer<T> {
    /// Allocate uninitialised device memory for `len` elements.
    pub fn alloc(len: usize) -> Result<Self> {
        ensure_cuda_initialized()?;
        let bytes = len.max(1) * std::mem::size_of::<T>();
        let mut ptr: *mut c_void = ptr::null_mut();
        let result = unsafe { cudaMalloc(&mut ptr, bytes) };
        if result != 0 {
            return Err(backend_err("cudaMalloc", result));
        }
        Ok(Self {
            ptr,
            len,
            _marker: PhantomData,
        })
    }

    /// Allocate and zero-fill.
    pub fn zeroed(len: usize) -> Result<Self> {
        let buf = Self::alloc(len)?;
        let bytes = len.max(1) * std::mem::size_of::<T>();
        let result = unsafe { cudaMemset(buf.ptr, 0, bytes) };
        if result != 0 {
            return Err(backend_err("cudaMemset", result));
        }
        Ok(buf)
    }

    /// Allocate and populate from host memory.
    pub fn from_slice(data: &[T]) -> Result<Self> {
        let buf = Self::alloc(data.len())?;
        let bytes = data.len() * std::mem::size_of::<T>();
        if bytes > 0 {
            let result = unsafe {
                cudaMemcpy(
                    buf.ptr,
                    data.as_ptr() as *const c_void,
                    bytes,
                    CUDA_MEMCPY_HOST_TO_DEVICE,
                )
            };
            if result != 0 {
                return Err(backend_err("cudaMemcpy(H2D)", result));
            }
        }
        Ok(buf)
    }

    /// Copy the first `count` elements back to the host.
    pub fn read(&self, count: usize) -> Result<Vec<T>> {
        debug_assert!(count <= self.len);
        let mut out: Vec<T> = Vec::with_capacity(count);
        let bytes = count * std::mem::size_of::<T>();
        if bytes > 0 {
            let result = unsafe {
                cudaMemcpy(
                    out.as_mut_ptr() as *mut c_void,
                    self.ptr,
                    bytes,
                    CUDA_MEMCPY_DEVICE_TO_HOST,
                )
            };
            if result != 0 {
                return Err(backend_err("cudaMemcpy(D2H)", result));
            }
        }
        // The copy above initialised exactly `count` elements.
        unsafe { out.set_len(count) };
        Ok(out)
    }

    /// Raw device pointer value. Kernel parameter lists want a pointer *to*
    /// this value, kept alive across the launch.
    #[inline]
    pub fn device_ptr(&self) -> *mut c_void {
        self.ptr
    }
}

impl<T: Copy> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        unsafe {
            cudaFree(self.ptr);
        }
    }
}
