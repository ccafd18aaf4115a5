// SPDX-License-Identifier: Apache-2.0

#[cfg(test)]
mod tests {
    use crate::constants::NFA_MAX_STATES;
    use crate::nfa::{encode_for_device, find_regex_matches, header_flags, Nfa, StateKind};
    use crate::test_utils::global_flags;
    use crate::types::{HwsedError, Pattern, PatternKind, SubstFlags};

    fn compile(pattern: &str, kind: PatternKind, ci: bool) -> Nfa {
        crate::regex::compile_pattern(&Pattern::new(pattern.as_bytes().to_vec(), kind), ci)
            .unwrap()
    }

    fn compile_ere(pattern: &str) -> Nfa {
        compile(pattern, PatternKind::RegexExtended, false)
    }

    fn compile_bre(pattern: &str) -> Nfa {
        compile(pattern, PatternKind::RegexBasic, false)
    }

    fn spans(nfa: &Nfa, text: &[u8]) -> Vec<(u32, u32)> {
        find_regex_matches(text, nfa, &global_flags())
            .iter()
            .map(|m| (m.start, m.end))
            .collect()
    }

    // ------------------------------------------------------------------
    // compilation
    // ------------------------------------------------------------------

    #[test]
    fn literal_chain() {
        let nfa = compile_ere("abc");
        assert_eq!(spans(&nfa, b"xxabcxx"), vec![(2, 5)]);
        assert_eq!(spans(&nfa, b"abd"), vec![]);
    }

    #[test]
    fn star_is_greedy_and_leftmost_longest() {
        let nfa = compile_ere("a*");
        // Leftmost start 0, longest end 3.
        assert_eq!(spans(&nfa, b"aaab")[0], (0, 3));

        let nfa = compile_ere("ba*");
        assert_eq!(spans(&nfa, b"xbaaay"), vec![(1, 5)]);
    }

    #[test]
    fn plus_and_question() {
        let nfa = compile_ere("ab+c");
        assert_eq!(spans(&nfa, b"abbbc"), vec![(0, 5)]);
        assert_eq!(spans(&nfa, b"ac"), vec![]);

        let nfa = compile_ere("ab?c");
        assert_eq!(spans(&nfa, b"abc ac"), vec![(0, 3), (4, 6)]);
    }

    #[test]
    fn alternation_lowest_precedence() {
        let nfa = compile_ere("cat|dog");
        assert_eq!(spans(&nfa, b"a dog and a cat"), vec![(2, 5), (12, 15)]);

        let nfa = compile_ere("ab|cd");
        assert_eq!(spans(&nfa, b"abd"), vec![(0, 2)]);
    }

    #[test]
    fn grouping_changes_shape() {
        let nfa = compile_ere("a(bc)*d");
        assert_eq!(spans(&nfa, b"abcbcd"), vec![(0, 6)]);
        assert_eq!(spans(&nfa, b"ad"), vec![(0, 2)]);
    }

    #[test]
    fn bounded_repetition() {
        let nfa = compile_ere("a{3}");
        assert_eq!(spans(&nfa, b"aaaa"), vec![(0, 3)]);

        let nfa = compile_ere("a{2,3}");
        assert_eq!(spans(&nfa, b"aaaaa"), vec![(0, 3), (3, 5)]);

        let nfa = compile_ere("a{2,}");
        assert_eq!(spans(&nfa, b"aaaa"), vec![(0, 4)]);
        assert_eq!(spans(&nfa, b"a"), vec![]);
    }

    #[test]
    fn character_classes() {
        let nfa = compile_ere("[abc]+");
        assert_eq!(spans(&nfa, b"xxabcabx"), vec![(2, 7)]);

        let nfa = compile_ere("[a-f0-9]+");
        assert_eq!(spans(&nfa, b"zz3fb9z"), vec![(2, 6)]);

        let nfa = compile_ere("[^0-9]+");
        assert_eq!(spans(&nfa, b"12ab34"), vec![(2, 4)]);
    }

    #[test]
    fn negated_class_never_matches_newline() {
        let nfa = compile_ere("[^x]+");
        assert_eq!(spans(&nfa, b"ab\ncd"), vec![(0, 2), (3, 5)]);
        assert!(!nfa.can_match_newline());
    }

    #[test]
    fn shorthand_classes() {
        let nfa = compile_ere(r"\d+");
        assert_eq!(spans(&nfa, b"ab12cd345"), vec![(2, 4), (6, 9)]);

        let nfa = compile_ere(r"\w+");
        assert_eq!(spans(&nfa, b"foo_1 bar"), vec![(0, 5), (6, 9)]);

        let nfa = compile_ere(r"\s+");
        assert_eq!(spans(&nfa, b"a \tb"), vec![(1, 3)]);
    }

    #[test]
    fn word_boundary_anchor() {
        let nfa = compile_ere(r"\bcat\b");
        assert_eq!(spans(&nfa, b"cat catalog cat"), vec![(0, 3), (12, 15)]);
    }

    #[test]
    fn line_anchors_are_multiline() {
        let nfa = compile_ere("^b");
        assert_eq!(spans(&nfa, b"a\nb\nba"), vec![(2, 3), (4, 5)]);
        assert!(nfa.anchored_start);

        let nfa = compile_ere("b$");
        assert_eq!(spans(&nfa, b"b\nab\nba"), vec![(0, 1), (3, 4)]);
        assert!(nfa.anchored_end);
    }

    #[test]
    fn dot_matches_any_byte_except_newline() {
        let nfa = compile_ere("a.c");
        assert_eq!(spans(&nfa, b"abc a\nc axc"), vec![(0, 3), (8, 11)]);
    }

    #[test]
    fn basic_dialect_escaped_operators() {
        // In the basic dialect + is literal and \+ is the operator.
        let nfa = compile_bre("a+");
        assert_eq!(spans(&nfa, b"a+ aa"), vec![(0, 2)]);

        let nfa = compile_bre(r"a\+");
        assert_eq!(spans(&nfa, b"aaa"), vec![(0, 3)]);

        let nfa = compile_bre(r"\(ab\)\{2\}");
        assert_eq!(spans(&nfa, b"abab"), vec![(0, 4)]);

        let nfa = compile_bre(r"cat\|dog");
        assert_eq!(spans(&nfa, b"dog"), vec![(0, 3)]);
    }

    #[test]
    fn extended_dialect_escaped_operators_are_literal() {
        let nfa = compile_ere(r"a\+b");
        assert_eq!(spans(&nfa, b"a+b"), vec![(0, 3)]);
    }

    #[test]
    fn case_insensitive_literals_and_classes() {
        let nfa = compile("hello", PatternKind::RegexExtended, true);
        assert_eq!(spans(&nfa, b"HeLLo"), vec![(0, 5)]);

        let nfa = compile("[a-c]+", PatternKind::RegexExtended, true);
        assert_eq!(spans(&nfa, b"AbC"), vec![(0, 3)]);
    }

    #[test]
    fn empty_pattern_matches_at_position_zero() {
        let nfa = compile_ere("");
        let records = find_regex_matches(b"abc", &nfa, &global_flags());
        assert_eq!(records[0].start, 0);
        assert_eq!(records[0].end, 0);
        // The executor advances at least one byte per step: every start is
        // distinct and increasing.
        for pair in records.windows(2) {
            assert!(pair[0].start < pair[1].start);
        }
        assert!(nfa.matches_empty());
    }

    #[test]
    fn non_global_takes_first_per_line() {
        let nfa = compile_ere("a");
        let records = find_regex_matches(b"aa\naa", &nfa, &SubstFlags::default());
        assert_eq!(
            records.iter().map(|m| (m.start, m.line)).collect::<Vec<_>>(),
            vec![(0, 0), (3, 1)]
        );
    }

    // ------------------------------------------------------------------
    // failure modes
    // ------------------------------------------------------------------

    #[test]
    fn unbalanced_group() {
        for pattern in ["(ab", "ab)", "((a)"] {
            let err = crate::regex::compile_pattern(
                &Pattern::new(pattern.as_bytes().to_vec(), PatternKind::RegexExtended),
                false,
            )
            .unwrap_err();
            assert!(
                matches!(err, HwsedError::UnbalancedGroup),
                "pattern {:?} gave {:?}",
                pattern,
                err
            );
        }
    }

    #[test]
    fn unbalanced_class() {
        let err = crate::regex::compile_pattern(
            &Pattern::new(b"[abc".to_vec(), PatternKind::RegexExtended),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, HwsedError::UnbalancedClass));
    }

    #[test]
    fn invalid_range() {
        let err = crate::regex::compile_pattern(
            &Pattern::new(b"[z-a]".to_vec(), PatternKind::RegexExtended),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, HwsedError::InvalidRange(_)));

        let err = crate::regex::compile_pattern(
            &Pattern::new(b"a{4,2}".to_vec(), PatternKind::RegexExtended),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, HwsedError::InvalidRange(_)));
    }

    #[test]
    fn state_limit_exceeded() {
        let err = crate::regex::compile_pattern(
            &Pattern::new(b"a{90}b{90}c{90}".to_vec(), PatternKind::RegexExtended),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, HwsedError::StateLimitExceeded(_)));
    }

    // ------------------------------------------------------------------
    // device encoding
    // ------------------------------------------------------------------

    #[test]
    fn encoding_layout_round_trips() {
        let nfa = compile_ere("^a[bc]$");
        let encoded = encode_for_device(&nfa);

        assert_eq!(encoded.header.num_states as usize, nfa.states.len());
        assert_eq!(encoded.header.start_state, nfa.start as u32);
        assert!(encoded.header.flags & header_flags::ANCHORED_START != 0);
        assert!(encoded.header.flags & header_flags::ANCHORED_END != 0);
        assert_eq!(encoded.states.len(), nfa.states.len() * 3);

        for (i, state) in nfa.states.iter().enumerate() {
            let word0 = encoded.states[i * 3];
            let word1 = encoded.states[i * 3 + 1];
            let word2 = encoded.states[i * 3 + 2];
            assert_eq!(word0 & 0xFF, state.kind as u32);
            assert_eq!(word0 >> 16, state.edge0 as u32);
            assert_eq!(word1 & 0xFFFF, state.edge1 as u32);
            assert_eq!((word1 >> 16) & 0xFF, state.byte as u32);
            assert_eq!(word2, state.bitmap_offset as u32);
        }
    }

    #[test]
    fn encoding_marks_absent_edges_with_sentinel() {
        let nfa = compile_ere("a");
        let encoded = encode_for_device(&nfa);
        // The literal state's second edge is unused.
        let literal = nfa
            .states
            .iter()
            .position(|s| s.kind == StateKind::Literal)
            .unwrap();
        assert_eq!(encoded.states[literal * 3 + 1] & 0xFFFF, 0xFFFF);
    }

    #[test]
    fn state_arena_stays_under_the_cap() {
        let nfa = compile_ere("(a|b|c){10}[x-z]+d?");
        assert!(nfa.states.len() <= NFA_MAX_STATES);
    }

    #[test]
    fn newline_detection_for_the_selector() {
        let nfa = compile_ere("a\nb");
        assert!(nfa.can_match_newline());
        let nfa = compile_ere("[^a]");
        assert!(!nfa.can_match_newline());
        let nfa = compile_ere(r"\s");
        assert!(nfa.can_match_newline());
    }
}
