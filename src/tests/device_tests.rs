// SPDX-License-Identifier: Apache-2.0

#[cfg(test)]
mod tests {
    use crate::constants::MAX_GPU_BUFFER;
    use crate::device::{ensure_device_budget, postprocess_matches, PTX_LITERAL_MATCH, PTX_NFA_MATCH};
    use crate::test_utils::global_flags;
    use crate::types::{HwsedError, MatchRecord, SubstFlags};

    #[test]
    fn budget_boundary() {
        // Exactly the budget succeeds; one byte more is TextTooLarge.
        assert!(ensure_device_budget(MAX_GPU_BUFFER).is_ok());
        let err = ensure_device_budget(MAX_GPU_BUFFER + 1).unwrap_err();
        assert!(matches!(err, HwsedError::TextTooLarge { .. }));
    }

    #[test]
    fn postpass_sorts_by_start() {
        let text = b"abcabc";
        let raw = vec![MatchRecord::new(3, 6, 0), MatchRecord::new(0, 3, 0)];
        let out = postprocess_matches(text, raw, &global_flags());
        assert_eq!(
            out.iter().map(|m| m.start).collect::<Vec<_>>(),
            vec![0, 3]
        );
    }

    #[test]
    fn postpass_drops_overlapping_candidates() {
        // The device reports every matching position; the host policy keeps
        // the earliest and resumes past its end.
        let text = b"aaaa";
        let raw = vec![
            MatchRecord::new(0, 2, 0),
            MatchRecord::new(1, 3, 0),
            MatchRecord::new(2, 4, 0),
        ];
        let out = postprocess_matches(text, raw, &global_flags());
        assert_eq!(
            out.iter().map(|m| (m.start, m.end)).collect::<Vec<_>>(),
            vec![(0, 2), (2, 4)]
        );
    }

    #[test]
    fn postpass_reconstructs_line_numbers() {
        let text = b"ab\ncd\nef\n";
        let raw = vec![
            MatchRecord::new(7, 8, 0),
            MatchRecord::new(0, 1, 0),
            MatchRecord::new(4, 5, 0),
        ];
        let out = postprocess_matches(text, raw, &global_flags());
        assert_eq!(
            out.iter().map(|m| m.line).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn postpass_collapses_to_first_per_line() {
        let text = b"aaa\naaa\n";
        let raw = vec![
            MatchRecord::new(0, 1, 0),
            MatchRecord::new(1, 2, 0),
            MatchRecord::new(2, 3, 0),
            MatchRecord::new(4, 5, 0),
            MatchRecord::new(5, 6, 0),
        ];
        let out = postprocess_matches(text, raw, &SubstFlags::default());
        assert_eq!(
            out.iter().map(|m| (m.start, m.line)).collect::<Vec<_>>(),
            vec![(0, 0), (4, 1)]
        );
    }

    #[test]
    fn postpass_is_idempotent() {
        let text = b"abcabc\nabc";
        let raw = vec![
            MatchRecord::new(0, 3, 0),
            MatchRecord::new(3, 6, 0),
            MatchRecord::new(7, 10, 0),
        ];
        let once = postprocess_matches(text, raw.clone(), &global_flags());
        let twice = postprocess_matches(text, once.clone(), &global_flags());
        assert_eq!(once, twice);
    }

    #[test]
    fn kernels_expose_the_expected_entry_points() {
        assert!(PTX_LITERAL_MATCH.contains(".entry literal_match"));
        assert!(PTX_NFA_MATCH.contains(".entry nfa_match"));
        // Both kernels collect through the dual atomic counters.
        assert!(PTX_LITERAL_MATCH.contains("atom.global.add.u32"));
        assert!(PTX_NFA_MATCH.contains("atom.global.add.u32"));
    }

    // The equivalence invariant: host and device agree as sets of
    // (start, end) pairs. Exercised only where a device exists.
    #[cfg(has_cuda)]
    #[test]
    fn device_literal_agrees_with_host() {
        use crate::device::device_literal_matches;
        use crate::literal::find_literal_matches;

        let mut text = Vec::new();
        for i in 0..100_000u32 {
            if i % 97 == 0 {
                text.extend_from_slice(b"needle");
            }
            text.push(if i % 61 == 0 { b'\n' } else { b'h' });
        }

        let flags = global_flags();
        let host = find_literal_matches(&text, b"needle", &flags);
        let (device, counts) = device_literal_matches(&text, b"needle", &flags).unwrap();
        assert!(!counts.truncated());

        let host_set: Vec<(u32, u32)> = host.iter().map(|m| (m.start, m.end)).collect();
        let device_set: Vec<(u32, u32)> = device.iter().map(|m| (m.start, m.end)).collect();
        assert_eq!(host_set, device_set);
    }

    #[cfg(has_cuda)]
    #[test]
    fn device_regex_agrees_with_host() {
        use crate::device::device_regex_matches;
        use crate::nfa::find_regex_matches;
        use crate::types::{Pattern, PatternKind};

        let mut text = Vec::new();
        for i in 0..50_000u32 {
            text.extend_from_slice(if i % 13 == 0 { b"ab12 " } else { b"abcd " });
            if i % 11 == 0 {
                text.push(b'\n');
            }
        }

        let pattern = Pattern::new(b"ab[0-9]+".to_vec(), PatternKind::RegexExtended);
        let nfa = crate::regex::compile_pattern(&pattern, false).unwrap();
        let flags = global_flags();

        let host = find_regex_matches(&text, &nfa, &flags);
        let (device, counts) = device_regex_matches(&text, &nfa, &flags).unwrap();
        assert!(!counts.truncated());

        let host_set: Vec<(u32, u32)> = host.iter().map(|m| (m.start, m.end)).collect();
        let device_set: Vec<(u32, u32)> = device.iter().map(|m| (m.start, m.end)).collect();
        assert_eq!(host_set, device_set);
    }
}
