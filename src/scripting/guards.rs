//! Bounds on the `string` library functions that run without yielding to the
//! instruction hook.
//!
//! Lua's pattern matcher backtracks inside a single C call, so the wall-clock
//! hook never sees a pathological `find` until it returns. Matchers here are
//! refused up front when the worst-case step count for the subject length
//! and the pattern's repetition items exceeds `MAX_MATCH_STEPS`.

use mlua::{Function, IntoLuaMulti, Lua, MultiValue, Table, Value};

/// Worst-case matcher steps a single call may take.
const MAX_MATCH_STEPS: f64 = 2.5e8;

const MATCHERS: &[&str] = &["find", "match", "gmatch", "gsub"];

pub(super) fn install(lua: &Lua) -> mlua::Result<()> {
    let string: Table = lua.globals().get("string")?;

    for &name in MATCHERS {
        let original: Function = string.get(name)?;
        let guarded = lua.create_function(move |_lua, args: MultiValue| {
            check_pattern(name, &args)?;
            original.call::<MultiValue>(args)
        })?;
        string.set(name, guarded)?;
    }

    // `rep` of an empty string and separator loops `n` times producing nothing.
    let original: Function = string.get("rep")?;
    let rep = lua.create_function(move |lua, args: MultiValue| {
        let count = match args.get(1) {
            Some(Value::Integer(n)) => *n as f64,
            Some(Value::Number(n)) => *n,
            _ => 0.0,
        };
        let produced = text_len(args.get(0)).unwrap_or(0) + text_len(args.get(2)).unwrap_or(0);
        if count > 0.0 && produced == 0 && matches!(args.get(0), Some(Value::String(_))) {
            return "".into_lua_multi(lua);
        }
        original.call::<MultiValue>(args)
    })?;
    string.set("rep", rep)
}

fn check_pattern(name: &str, args: &MultiValue) -> mlua::Result<()> {
    if name == "find" && args.get(3).is_some_and(truthy) {
        return Ok(());
    }
    let (Some(subject_len), Some(Value::String(pattern))) = (text_len(args.get(0)), args.get(1))
    else {
        // Wrong argument types are reported by the original function.
        return Ok(());
    };
    let pattern = pattern.as_bytes();
    let steps = match_steps(subject_len, &pattern, name != "gmatch");
    if steps > MAX_MATCH_STEPS {
        return Err(mlua::Error::RuntimeError(format!(
            "string.{name}: pattern too complex for a {subject_len}-byte subject"
        )));
    }
    Ok(())
}

fn text_len(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::String(s) => Some(s.as_bytes().len()),
        Value::Integer(n) => Some(n.to_string().len()),
        Value::Number(n) => Some(n.to_string().len()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}

/// Backtracking bound: each repetition item can revisit every subject
/// position, and an unanchored search restarts at every position.
fn match_steps(subject_len: usize, pattern: &[u8], anchor_allowed: bool) -> f64 {
    let anchored = anchor_allowed && pattern.first() == Some(&b'^');
    let exponent = repetitions(pattern) + u32::from(!anchored);
    ((subject_len + 1) as f64).powi(exponent as i32)
}

/// Counts `*`, `+` and `-` items outside escapes and character sets.
fn repetitions(pattern: &[u8]) -> u32 {
    let mut count = 0;
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            b'%' => {
                // `%bxy` consumes two delimiter bytes after the class letter.
                i += if pattern.get(i + 1) == Some(&b'b') { 4 } else { 2 };
            }
            b'[' => i = skip_set(pattern, i),
            b'*' | b'+' | b'-' => {
                count += 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    count
}

/// Index just past the `]` closing the set opened at `open`.
fn skip_set(pattern: &[u8], open: usize) -> usize {
    let mut i = open + 1;
    if pattern.get(i) == Some(&b'^') {
        i += 1;
    }
    if pattern.get(i) == Some(&b']') {
        i += 1;
    }
    while i < pattern.len() && pattern[i] != b']' {
        i += if pattern[i] == b'%' { 2 } else { 1 };
    }
    i + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repetitions_skip_escapes_and_sets() {
        assert_eq!(repetitions(b"%w+"), 1);
        assert_eq!(repetitions(b"(%w+)=(%w+)"), 2);
        assert_eq!(repetitions(b"[%w_]+=(.-)$"), 2);
        assert_eq!(repetitions(b"a%*b%-c"), 0);
        assert_eq!(repetitions(b"[*+-]"), 0);
        assert_eq!(repetitions(b"[]*]x"), 0);
        assert_eq!(repetitions(b"%b()"), 0);
        assert_eq!(repetitions(b"%f[%w]%w+"), 1);
    }

    #[test]
    fn backtracking_patterns_exceed_the_step_bound() {
        let nested = "a*".repeat(5) + "b";
        assert!(match_steps(3000, nested.as_bytes(), true) > MAX_MATCH_STEPS);
        assert!(match_steps(20, b"(%w+)=(%w+)", true) <= MAX_MATCH_STEPS);
        assert!(match_steps(10_000, b"%s+", true) <= MAX_MATCH_STEPS);
        assert!(match_steps(1_000, b"^(%w+)=(%w+)", true) <= MAX_MATCH_STEPS);
        assert!(match_steps(1_000, b"^(%w+)=(%w+)", false) > MAX_MATCH_STEPS);
    }

    #[test]
    fn installed_guards_refuse_only_pathological_calls() {
        let lua = Lua::new();
        install(&lua).expect("install");

        let (key, value): (String, String) = lua
            .load(r#"return ("k=v"):match("(%w+)=(%w+)")"#)
            .eval()
            .expect("ordinary match");
        assert_eq!((key.as_str(), value.as_str()), ("k", "v"));

        let plain: i64 = lua
            .load(r#"return string.find(string.rep("a*", 200), "a*a*a*", 1, true)"#)
            .eval()
            .expect("plain find");
        assert_eq!(plain, 1);

        let empty: String = lua.load(r#"return string.rep("", 1e15)"#).eval().expect("rep");
        assert_eq!(empty, "");

        let err = lua
            .load(r#"local s = string.rep("a", 3000) return s:find(string.rep("a*", 5) .. "b")"#)
            .exec()
            .expect_err("nested repetition refused");
        assert!(err.to_string().contains("pattern too complex"), "{err}");
    }
}
