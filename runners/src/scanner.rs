//! The per-file scanning state machine.
//!
//! A single pass over the tokens of a test file recognizes `TEST_GROUP`,
//! `TEST`, and `IGNORE_TEST` macro invocations, mirrors preprocessor
//! directives textually, and emits the runner body as it goes. Transitions
//! are strict: an unexpected token abandons the pattern in progress and is
//! reconsidered from scratch.

use crate::GroupSet;
use if_chain::if_chain;
use unimake_core::tokenizer::{DIRECTIVE_WORDS, Tokenizer, directive_word};

pub(crate) const BANNER: &str = "/* AUTOGENERATED FILE. DO NOT EDIT. */\n";

/// Progress through a `TEST_GROUP(name)` or `TEST(group, case)` pattern.
enum State {
    Nothing,
    AfterGroupKeyword,
    AfterGroupLParen,
    AfterGroupName(String),
    AfterTestKeyword,
    AfterTestLParen,
    AfterTestGroup(String),
    AfterTestComma(String),
    AfterTestCase(String, String),
}

pub(crate) struct ScanOutput {
    pub content: String,
    pub declared_any_group: bool,
}

struct Emitter {
    content: String,
    /// The group whose `TEST_GROUP_RUNNER` body is currently open.
    open_group: Option<String>,
    /// Position in `content` just past the opening `{\n`, used to collapse
    /// a body that stayed empty into `{ }`.
    open_mark: usize,
    declared_any_group: bool,
}

impl Emitter {
    fn new() -> Self {
        Self {
            content: BANNER.to_owned(),
            open_group: None,
            open_mark: 0,
            declared_any_group: false,
        }
    }

    fn declare_group(&mut self, name: &str, groups: &mut GroupSet) {
        self.close_open_group();
        self.content.push('\n');
        self.content.push_str("TEST_GROUP_RUNNER(");
        self.content.push_str(name);
        self.content.push_str(") {\n");
        self.open_group = Some(name.to_owned());
        self.open_mark = self.content.len();
        self.declared_any_group = true;
        groups.insert(name.to_owned());
    }

    fn emit_case(&mut self, group: &str, case: &str, groups: &mut GroupSet) {
        // A case with no body open (the file never declared a group, or the
        // pattern around the declaration was malformed) opens one for the
        // case's own group.
        if self.open_group.is_none() {
            self.declare_group(group, groups);
        }
        self.content.push_str(&format!(
            "    RUN_TEST_CASE({group}, {case}); /* TEST_{group}_{case}_ */\n"
        ));
    }

    fn emit_directive(&mut self, head: &[u8], rest: &[u8]) {
        self.content
            .push_str(&String::from_utf8_lossy(head));
        self.content
            .push_str(&String::from_utf8_lossy(rest));
        self.content.push('\n');
    }

    fn close_open_group(&mut self) {
        if self.open_group.take().is_none() {
            return;
        }
        if self.content.len() == self.open_mark {
            // Nothing went into the body; render it on one line.
            self.content.truncate(self.open_mark - 1);
            self.content.push_str(" }\n");
        } else {
            self.content.push_str("}\n");
        }
    }

    fn finish(mut self) -> ScanOutput {
        self.close_open_group();
        ScanOutput {
            content: self.content,
            declared_any_group: self.declared_any_group,
        }
    }
}

/// Scans one test file and produces its runner content. Newly seen groups
/// are added to `groups` in declaration order.
pub(crate) fn scan_test_file(buf: &[u8], groups: &mut GroupSet) -> ScanOutput {
    let mut tokenizer = Tokenizer::new(buf);
    let mut emitter = Emitter::new();
    let mut state = State::Nothing;

    while let Some(token) = tokenizer.next_token() {
        // Comments are skipped entirely; a commented-out TEST never runs.
        if token.starts_with(b"//") || token.starts_with(b"/*") {
            continue;
        }

        if token.first() == Some(&b'#') {
            if_chain! {
                if let Some(word) = directive_word(token);
                if DIRECTIVE_WORDS.contains(&word);
                then {
                    let rest = tokenizer.rest_of_directive();
                    emitter.emit_directive(token, rest);
                } else {
                    // Unknown directives are consumed and dropped.
                    let _: &[u8] = tokenizer.rest_of_directive();
                }
            }
            state = State::Nothing;
            continue;
        }

        let Ok(text) = std::str::from_utf8(token) else {
            state = State::Nothing;
            continue;
        };

        state = step(state, text, &mut emitter, groups);
    }

    emitter.finish()
}

fn step(state: State, text: &str, emitter: &mut Emitter, groups: &mut GroupSet) -> State {
    match state {
        State::Nothing => start(text),
        State::AfterGroupKeyword => {
            if text == "(" {
                State::AfterGroupLParen
            } else {
                start(text)
            }
        }
        State::AfterGroupLParen => {
            if is_name(text) {
                State::AfterGroupName(text.to_owned())
            } else {
                start(text)
            }
        }
        State::AfterGroupName(name) => {
            if text == ")" {
                emitter.declare_group(&name, groups);
                State::Nothing
            } else {
                start(text)
            }
        }
        State::AfterTestKeyword => {
            if text == "(" {
                State::AfterTestLParen
            } else {
                start(text)
            }
        }
        State::AfterTestLParen => {
            if is_name(text) {
                State::AfterTestGroup(text.to_owned())
            } else {
                start(text)
            }
        }
        State::AfterTestGroup(group) => {
            if text == "," {
                State::AfterTestComma(group)
            } else {
                start(text)
            }
        }
        State::AfterTestComma(group) => {
            if is_name(text) {
                State::AfterTestCase(group, text.to_owned())
            } else {
                start(text)
            }
        }
        State::AfterTestCase(group, case) => {
            if text == ")" {
                emitter.emit_case(&group, &case, groups);
                State::Nothing
            } else {
                start(text)
            }
        }
    }
}

fn start(text: &str) -> State {
    match text {
        "TEST_GROUP" => State::AfterGroupKeyword,
        "TEST" | "IGNORE_TEST" => State::AfterTestKeyword,
        _ => State::Nothing,
    }
}

fn is_name(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::scan_test_file;
    use crate::GroupSet;

    fn scan(input: &str) -> (String, Vec<String>) {
        let mut groups = GroupSet::new();
        let output = scan_test_file(input.as_bytes(), &mut groups);
        (output.content, groups.into_iter().collect())
    }

    #[test]
    fn basic_group_and_case() {
        let (content, groups) = scan(
            "#include \"unity_fixture.h\"\n\
             TEST_GROUP(g);\n\
             TEST_SETUP(g) {}\n\
             TEST_TEAR_DOWN(g) {}\n\
             TEST(g, t) {}\n",
        );
        assert_eq!(
            content,
            "/* AUTOGENERATED FILE. DO NOT EDIT. */\n\
             #include \"unity_fixture.h\"\n\
             \n\
             TEST_GROUP_RUNNER(g) {\n\
             \x20\x20\x20\x20RUN_TEST_CASE(g, t); /* TEST_g_t_ */\n\
             }\n"
        );
        assert_eq!(groups, ["g"]);
    }

    #[test]
    fn commented_out_tests_are_ignored() {
        let (content, _) = scan(
            "TEST_GROUP(g);\n\
             // TEST(g, line_commented) {}\n\
             /* TEST(g, block_commented) {} */\n",
        );
        assert!(!content.contains("RUN_TEST_CASE"));
        assert!(content.contains("TEST_GROUP_RUNNER(g) { }\n"));
    }

    #[test]
    fn ignored_tests_still_register() {
        let (content, _) = scan("TEST_GROUP(g);\nIGNORE_TEST(g, skipped) {}\n");
        assert!(content.contains("    RUN_TEST_CASE(g, skipped); /* TEST_g_skipped_ */\n"));
    }

    #[test]
    fn back_to_back_groups_produce_an_empty_body() {
        let (content, groups) = scan("TEST_GROUP(A);\nTEST_GROUP(B);\nTEST(B, t) {}\n");
        assert_eq!(
            content,
            "/* AUTOGENERATED FILE. DO NOT EDIT. */\n\
             \n\
             TEST_GROUP_RUNNER(A) { }\n\
             \n\
             TEST_GROUP_RUNNER(B) {\n\
             \x20\x20\x20\x20RUN_TEST_CASE(B, t); /* TEST_B_t_ */\n\
             }\n"
        );
        assert_eq!(groups, ["A", "B"]);
    }

    #[test]
    fn conditional_directives_pass_through_in_order() {
        let (content, _) = scan(
            "#include \"unity_fixture.h\"\n\
             TEST_GROUP(g);\n\
             #ifdef FEATURE\n\
             TEST(g, with_feature) {}\n\
             #else\n\
             TEST(g, without_feature) {}\n\
             #endif\n",
        );
        let ifdef = content.find("#ifdef FEATURE").unwrap();
        let with_feature = content.find("RUN_TEST_CASE(g, with_feature)").unwrap();
        let else_ = content.find("#else").unwrap();
        let without_feature = content.find("RUN_TEST_CASE(g, without_feature)").unwrap();
        let endif = content.find("#endif").unwrap();
        assert!(ifdef < with_feature);
        assert!(with_feature < else_);
        assert!(else_ < without_feature);
        assert!(without_feature < endif);
    }

    #[test]
    fn malformed_patterns_reset_without_output() {
        let (content, groups) = scan("TEST_GROUP;\nTEST(g t) {}\nTEST[x, y] {}\n");
        assert!(!content.contains("RUN_TEST_CASE"));
        assert!(groups.is_empty());
    }

    #[test]
    fn a_case_without_a_declared_group_opens_one() {
        let (content, groups) = scan("TEST(g, t) {}\n");
        assert!(content.contains("TEST_GROUP_RUNNER(g) {"));
        assert!(content.contains("RUN_TEST_CASE(g, t);"));
        assert_eq!(groups, ["g"]);
    }

    #[test]
    fn unknown_directives_are_dropped() {
        let (content, _) = scan("#pragma once\nTEST_GROUP(g);\nTEST(g, t) {}\n");
        assert!(!content.contains("#pragma"));
        assert!(content.contains("RUN_TEST_CASE(g, t);"));
    }

    #[test]
    fn redeclaring_a_group_is_idempotent_in_the_group_set() {
        let mut groups = GroupSet::new();
        let _ = scan_test_file(b"TEST_GROUP(g);\nTEST_GROUP(g);\n", &mut groups);
        assert_eq!(groups.len(), 1);
    }
}
