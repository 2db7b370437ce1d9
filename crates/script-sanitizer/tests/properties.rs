use proptest::prelude::*;
use script_sanitizer::ScriptSanitizer;

/// Fragments that look like real script pieces, several of them hiding the trigger.
fn fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "debugger",
        "debugger;",
        " ",
        "\n",
        ";",
        "x = 1",
        "obj.debugger",
        "{ debugger: 1 }",
        "'debugger'",
        "\"de\" + \"bugger\"",
        "eval('debugger')",
        "setTimeout(\"debugger\", 10)",
        "new Function('debugger')",
        "String.fromCharCode(100,101,98,117,103,103,101,114)",
        "'\\x64ebugger'",
        "// debugger",
        "/* debugger */",
        "/de+bug/g",
        "a / b",
        "`tpl ${x} debugger`",
        "(function(){}).constructor('debugger')()",
        "if (x) ",
        "function f() {",
        "}",
        "'",
        "\\",
    ])
}

fn script() -> impl Strategy<Value = String> {
    prop::collection::vec(fragment(), 0..12).prop_map(|parts| parts.concat())
}

fn harmless_fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "let a = 1;",
        " ",
        "\n",
        "'text'",
        "\"a\" + \"b\"",
        "eval(code)",
        "setTimeout(tick, 10);",
        "new Function('a', 'return a')",
        "String.fromCharCode(72, 105)",
        "'\\x41'",
        "// note",
        "/ab+c/i",
        "x / y",
        "`tpl ${x}`",
    ])
}

proptest! {
    #[test]
    fn sanitizing_is_idempotent(source in script()) {
        let sanitizer = ScriptSanitizer::standard();
        let once = sanitizer.sanitize(&source).into_owned();
        let twice = sanitizer.sanitize(&once).into_owned();
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn scripts_without_the_trigger_are_left_alone(
        parts in prop::collection::vec(harmless_fragment(), 0..10)
    ) {
        let source = parts.concat();
        let outcome = ScriptSanitizer::standard().sanitize_with_report(&source);
        prop_assert!(!outcome.changed());
        prop_assert_eq!(outcome.text.as_ref(), source.as_str());
    }

    #[test]
    fn arbitrary_text_never_panics(source in ".{0,200}") {
        let _ = ScriptSanitizer::standard().sanitize(&source);
    }
}

#[test]
fn bare_trigger_never_survives_as_code() {
    let sanitizer = ScriptSanitizer::standard();
    let out = sanitizer.sanitize("debugger\ndebugger;debugger");
    assert_eq!(out, "void 0;\nvoid 0;void 0;");
}

#[test]
fn data_strings_mentioning_the_trigger_are_kept() {
    let sanitizer = ScriptSanitizer::standard();
    for source in [
        "console.log('Open the ' + 'debugger panel');",
        "label = \"debugger\\x21\";",
        "hint = 'use the debugger' + '!';",
        "title = \"\\u00e9tat du debugger\";",
    ] {
        let outcome = sanitizer.sanitize_with_report(source);
        assert!(!outcome.changed(), "{source} -> {}", outcome.text);
    }
}

#[test]
fn hidden_triggers_in_literals_are_still_neutralized() {
    let sanitizer = ScriptSanitizer::standard();
    assert_eq!(sanitizer.sanitize("x = 'de' + 'bugger';"), "x = 'void 0;';");
    assert_eq!(sanitizer.sanitize("x = \"\\x64ebugger\";"), "x = \"void 0;\";");
    assert_eq!(sanitizer.sanitize("eval('debugger' + ';')"), "eval('void 0;')");
}

#[test]
fn division_and_control_heads_do_not_hide_statements() {
    let sanitizer = ScriptSanitizer::standard();
    assert_eq!(
        sanitizer.sanitize("var n=0;n++/2;debugger;var m=1/3;"),
        "var n=0;n++/2;void 0;var m=1/3;"
    );
    assert_eq!(
        sanitizer.sanitize("if(ok)/\"/.test(s);debugger;var q=\"z\";"),
        "if(ok)/\"/.test(s);void 0;var q=\"z\";"
    );
}
