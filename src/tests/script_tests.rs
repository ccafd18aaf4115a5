// SPDX-License-Identifier: Apache-2.0

#[cfg(test)]
mod tests {
    use crate::script::{parse_script, Dialect};
    use crate::types::{
        Address, AddressBound, CommandKind, HwsedError, PatternKind,
    };

    fn parse_one(script: &str) -> crate::types::Command {
        let mut commands = parse_script(script, Dialect::Basic).unwrap();
        assert_eq!(commands.len(), 1, "expected one command from {:?}", script);
        commands.pop().unwrap()
    }

    #[test]
    fn substitute_basic_shape() {
        let cmd = parse_one("s/world/universe/");
        assert!(cmd.address.is_none());
        let CommandKind::Substitute {
            pattern,
            replacement,
            flags,
        } = cmd.kind
        else {
            panic!("not a substitute");
        };
        assert_eq!(pattern.bytes, b"world");
        assert_eq!(pattern.kind, PatternKind::Literal);
        assert_eq!(replacement, b"universe");
        // Substitution is global unless the `1` flag restricts it.
        assert!(flags.global);
        assert!(!flags.case_insensitive && !flags.first_only);
    }

    #[test]
    fn substitute_flags() {
        let cmd = parse_one("s/a/b/gi");
        let CommandKind::Substitute { flags, .. } = cmd.kind else {
            panic!("not a substitute");
        };
        assert!(flags.global);
        assert!(flags.case_insensitive);

        let cmd = parse_one("s/a/b/I1");
        let CommandKind::Substitute { flags, .. } = cmd.kind else {
            panic!("not a substitute");
        };
        assert!(flags.case_insensitive);
        assert!(flags.first_only);
        // first-only collapses with the non-global policy.
        assert!(flags.global);
    }

    #[test]
    fn unknown_flags_are_ignored() {
        let cmd = parse_one("s/a/b/gxz9");
        let CommandKind::Substitute { flags, .. } = cmd.kind else {
            panic!("not a substitute");
        };
        assert!(flags.global);
        assert!(!flags.case_insensitive);
    }

    #[test]
    fn arbitrary_delimiters() {
        for script in ["s,a,b,", "s#a#b#", "s|a|b|", "s;a;b;"] {
            let cmd = parse_one(script);
            let CommandKind::Substitute { pattern, replacement, .. } = cmd.kind else {
                panic!("not a substitute");
            };
            assert_eq!(pattern.bytes, b"a", "script {:?}", script);
            assert_eq!(replacement, b"b", "script {:?}", script);
        }
    }

    #[test]
    fn escaped_delimiter_in_pattern() {
        let cmd = parse_one(r"s,a\,b,x,");
        let CommandKind::Substitute { pattern, .. } = cmd.kind else {
            panic!("not a substitute");
        };
        assert_eq!(pattern.bytes, b"a,b");
    }

    #[test]
    fn pattern_escapes_resolve_at_parse_time() {
        let cmd = parse_one(r"s/a\tb/x/");
        let CommandKind::Substitute { pattern, .. } = cmd.kind else {
            panic!("not a substitute");
        };
        assert_eq!(pattern.bytes, b"a\tb");
    }

    #[test]
    fn replacement_keeps_its_escapes_raw() {
        let cmd = parse_one(r"s/a/\&x\n/");
        let CommandKind::Substitute { replacement, .. } = cmd.kind else {
            panic!("not a substitute");
        };
        assert_eq!(replacement, br"\&x\n");
    }

    #[test]
    fn leading_caret_classifies_as_anchored_literal() {
        let cmd = parse_one("s/^foo/bar/");
        let CommandKind::Substitute { pattern, flags, .. } = cmd.kind else {
            panic!("not a substitute");
        };
        assert_eq!(pattern.kind, PatternKind::Literal);
        assert_eq!(pattern.bytes, b"foo");
        assert!(flags.line_anchor);
    }

    #[test]
    fn metacharacters_classify_as_regex() {
        let cmd = parse_one("s/f.o/bar/");
        let CommandKind::Substitute { pattern, .. } = cmd.kind else {
            panic!("not a substitute");
        };
        assert_eq!(pattern.kind, PatternKind::RegexBasic);

        let mut commands = parse_script("s/a+b/x/", Dialect::Extended).unwrap();
        let CommandKind::Substitute { pattern, .. } = commands.pop().unwrap().kind else {
            panic!("not a substitute");
        };
        assert_eq!(pattern.kind, PatternKind::RegexExtended);
    }

    #[test]
    fn plus_is_literal_in_basic_dialect() {
        let cmd = parse_one("s/a+b/x/");
        let CommandKind::Substitute { pattern, .. } = cmd.kind else {
            panic!("not a substitute");
        };
        assert_eq!(pattern.kind, PatternKind::Literal);
        assert_eq!(pattern.bytes, b"a+b");
    }

    #[test]
    fn numeric_addresses() {
        let cmd = parse_one("3d");
        assert_eq!(
            cmd.address,
            Some(Address::Single(AddressBound::Line(3)))
        );
        assert_eq!(cmd.kind, CommandKind::Delete);

        let cmd = parse_one("2,4d");
        assert_eq!(
            cmd.address,
            Some(Address::Range(AddressBound::Line(2), AddressBound::Line(4)))
        );

        let cmd = parse_one("2,$p");
        assert_eq!(
            cmd.address,
            Some(Address::Range(AddressBound::Line(2), AddressBound::Last))
        );

        let cmd = parse_one("$d");
        assert_eq!(cmd.address, Some(Address::Single(AddressBound::Last)));
    }

    #[test]
    fn addressed_substitute() {
        let cmd = parse_one("2s/line/LINE/");
        assert_eq!(
            cmd.address,
            Some(Address::Single(AddressBound::Line(2)))
        );
    }

    #[test]
    fn pattern_address_commands() {
        let cmd = parse_one("/bar/d");
        let Some(Address::Pattern(pattern)) = &cmd.address else {
            panic!("expected pattern address");
        };
        assert_eq!(pattern.bytes, b"bar");
        assert_eq!(cmd.kind, CommandKind::Delete);

        let cmd = parse_one("/foo/p");
        assert_eq!(cmd.kind, CommandKind::Print);
    }

    #[test]
    fn transliterate_shape() {
        let cmd = parse_one("y/abc/xyz/");
        let CommandKind::Transliterate { from, to } = cmd.kind else {
            panic!("not a transliterate");
        };
        assert_eq!(from, b"abc");
        assert_eq!(to, b"xyz");
    }

    #[test]
    fn transliterate_length_mismatch() {
        let err = parse_script("y/ab/xyz/", Dialect::Basic).unwrap_err();
        assert!(matches!(err, HwsedError::MalformedTransliterate(_)));
    }

    #[test]
    fn bare_delete_requires_address() {
        let err = parse_script("d", Dialect::Basic).unwrap_err();
        assert!(matches!(err, HwsedError::EmptyPatternWithNoAddress));
        let err = parse_script("p", Dialect::Basic).unwrap_err();
        assert!(matches!(err, HwsedError::EmptyPatternWithNoAddress));
    }

    #[test]
    fn malformed_expressions() {
        for script in ["s/a/b", "s", "q", "2,", "sXaXb", "s/a/b/; s/c"] {
            let err = parse_script(script, Dialect::Basic).unwrap_err();
            assert!(
                matches!(err, HwsedError::MalformedExpression(_)),
                "script {:?} gave {:?}",
                script,
                err
            );
        }
    }

    #[test]
    fn empty_substitute_pattern_is_malformed() {
        let err = parse_script("s///", Dialect::Basic).unwrap_err();
        assert!(matches!(err, HwsedError::MalformedExpression(_)));
    }

    #[test]
    fn inverted_range_is_malformed() {
        let err = parse_script("4,2d", Dialect::Basic).unwrap_err();
        assert!(matches!(err, HwsedError::MalformedExpression(_)));
    }

    #[test]
    fn multiple_expressions() {
        let commands = parse_script("s/foo/X/; s/bar/Y/", Dialect::Basic).unwrap();
        assert_eq!(commands.len(), 2);

        let commands = parse_script("1d\n2d\n3d", Dialect::Basic).unwrap();
        assert_eq!(commands.len(), 3);
    }

    #[test]
    fn blank_separated_substitutes_both_parse() {
        // The flags scan must stop at a blank, not swallow the next
        // expression as ignored flag characters.
        let commands = parse_script("s/foo/X/ s/bar/Y/", Dialect::Basic).unwrap();
        assert_eq!(commands.len(), 2);
        let CommandKind::Substitute { pattern, .. } = &commands[1].kind else {
            panic!("not a substitute");
        };
        assert_eq!(pattern.bytes, b"bar");

        let commands = parse_script("s/a/b/g 2d", Dialect::Basic).unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1].kind, CommandKind::Delete);
    }
}
