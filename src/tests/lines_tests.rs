// SPDX-License-Identifier: Apache-2.0

#[cfg(test)]
mod tests {
    use crate::lines::{count_newlines, find_newline, next_line_start, LineIndex};

    #[test]
    fn count_scalar_and_vector_agree() {
        // Long enough to cross the vector threshold, with newlines placed
        // at awkward offsets around the 32-byte chunk boundary.
        let mut text = Vec::new();
        for i in 0..1000 {
            text.push(if i % 7 == 0 { b'\n' } else { b'x' });
        }
        let expected = text.iter().filter(|&&b| b == b'\n').count();
        assert_eq!(count_newlines(&text, 0, text.len()), expected);

        // Sub-spans at unaligned offsets.
        assert_eq!(
            count_newlines(&text, 3, 995),
            text[3..995].iter().filter(|&&b| b == b'\n').count()
        );
    }

    #[test]
    fn count_empty_and_short_spans() {
        assert_eq!(count_newlines(b"", 0, 0), 0);
        assert_eq!(count_newlines(b"a\nb", 0, 3), 1);
        assert_eq!(count_newlines(b"a\nb", 2, 3), 0);
    }

    #[test]
    fn find_newline_positions() {
        let text = b"abc\ndef\n";
        assert_eq!(find_newline(text, 0), Some(3));
        assert_eq!(find_newline(text, 4), Some(7));
        assert_eq!(find_newline(text, 8), None);

        // Past the vector width.
        let mut long = vec![b'x'; 100];
        long[77] = b'\n';
        assert_eq!(find_newline(&long, 0), Some(77));
        assert_eq!(find_newline(&long, 78), None);
    }

    #[test]
    fn next_line_start_walks_lines() {
        let text = b"ab\ncd\nef";
        assert_eq!(next_line_start(text, 0), 3);
        assert_eq!(next_line_start(text, 3), 6);
        assert_eq!(next_line_start(text, 6), 8);
    }

    #[test]
    fn line_index_terminated_lines() {
        let index = LineIndex::build(b"ab\ncd\n");
        assert_eq!(index.line_count(), 2);
        assert_eq!(index.span(0), (0, 3));
        assert_eq!(index.span(1), (3, 6));
    }

    #[test]
    fn line_index_trailing_fragment_is_last_line() {
        let index = LineIndex::build(b"ab\ncd");
        assert_eq!(index.line_count(), 2);
        assert_eq!(index.span(1), (3, 5));
    }

    #[test]
    fn line_index_empty_buffer() {
        let index = LineIndex::build(b"");
        assert_eq!(index.line_count(), 0);
    }

    #[test]
    fn line_of_offsets() {
        let index = LineIndex::build(b"ab\ncd\nef\n");
        assert_eq!(index.line_of(0), 0);
        assert_eq!(index.line_of(2), 0);
        assert_eq!(index.line_of(3), 1);
        assert_eq!(index.line_of(8), 2);
    }

    #[test]
    fn device_arrays_cover_the_buffer() {
        let index = LineIndex::build(b"ab\ncd\nef");
        let (offsets, lengths) = index.as_device_arrays();
        assert_eq!(offsets, vec![0, 3, 6]);
        assert_eq!(lengths, vec![3, 3, 2]);
    }
}
