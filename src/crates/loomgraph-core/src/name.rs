//! Name algebra: parsing and classifying node references
//!
//! Every reference a node definition makes to another node — in its `args`
//! list or in an explicit `using(...)` call — is a short string with an
//! optional modifier prefix and an optional dotted member path:
//!
//! ```text
//! !checkAuth.user     important input, read the `.user` member path
//! ?logAccess          void input, side-effect only, not a handler argument
//! %config             partial input, used only to configure peers
//! +internalCheck      silent output field, suppressed from the output map
//! args.userId         reference to the parent node's own declared argument
//! args.*              reference to all of the parent's declared arguments
//! loadProfile_        private node, consumable only within its own scope
//! ```
//!
//! `+` is only meaningful on a builder output field (`spec.md` §6): it marks
//! that field as built and wired like any other requested output, but
//! suppressed from the final output map. On an `args` reference it carries no
//! special runtime meaning, but still parses — a node compiled only to
//! satisfy a silent output stays a bare `Argument` reference if some other
//! node also happens to name it.
//!
//! This module only parses and classifies; it does not resolve a reference
//! to a compiled-plan name (that's the [`resolver`](crate::compiler::resolver)
//! and [`peer`](crate::compiler::peer) modules' job).

use serde::{Deserialize, Serialize};

/// The modifier prefix on a reference, determining how the compiler treats
/// the corresponding input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    /// Bare reference: becomes a positional handler argument.
    Argument,
    /// `!` prefix: must resolve before the node starts; contributes to the
    /// dedup-sensitive complete hash.
    Important,
    /// `?` prefix: resolved for side effects only, never becomes an
    /// argument.
    Void,
    /// `%` prefix: used only to configure sibling peers, never becomes an
    /// argument and never contributes to hashing.
    Partial,
    /// Added by the implicit-important-injection rewriter pass, not by
    /// authoring syntax; behaves like [`InputKind::Important`] for ordering
    /// purposes but contributes no handler argument and is never written
    /// back to authoring-time input lists.
    ImplicitImportant,
}

impl InputKind {
    /// Whether this input becomes a positional argument to the handler.
    pub fn is_argument(self) -> bool {
        matches!(self, InputKind::Argument)
    }

    /// Whether this input must be fully resolved, and checked for errors,
    /// before the node's handler runs.
    pub fn is_guard(self) -> bool {
        matches!(self, InputKind::Important | InputKind::ImplicitImportant | InputKind::Void)
    }

    /// Whether this input contributes to the node's complete (dedup) hash.
    /// Partial inputs configure peers at compile time and leave no runtime
    /// trace.
    pub fn contributes_to_hash(self) -> bool {
        !matches!(self, InputKind::Partial)
    }
}

/// A parsed reference, e.g. `!checkAuth.user` or `args.*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRef {
    pub kind: InputKind,
    /// `Root` for a plain node reference; `Arg(name)` / `AllArgs` for a
    /// reference into the enclosing node's own declared arguments.
    pub target: RefTarget,
    /// Dotted member path after the base name, e.g. `["user", "id"]` for
    /// `!checkAuth.user.id`.
    pub member_path: Vec<String>,
    /// Whether this reference carried the `+` output-field modifier.
    /// Meaningless outside a builder output field; `compiler::peer`'s
    /// `BuildRequest` is the only caller that reads this.
    pub silent: bool,
}

/// What a parsed reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// A sibling/ancestor node, by its short (alias) name.
    Node(String),
    /// `args.NAME` — one of the enclosing node's own declared arguments.
    Arg(String),
    /// `args.*` — all of the enclosing node's declared arguments, in order.
    AllArgs,
}

/// Parse one reference string from a node's `args` list, a `using(...)`
/// call, or a builder output field, into a [`ParsedRef`].
///
/// Grammar: `[!|?|%|+] IDENT ("." IDENT)*`, or the special form
/// `args.IDENT` / `args.*` (which never carries a modifier prefix — an
/// argument reference is always a plain handler argument by construction).
pub fn parse_ref(raw: &str) -> Result<ParsedRef, String> {
    if raw.is_empty() {
        return Err("empty node reference".to_string());
    }

    let (kind, silent, rest) = match raw.as_bytes()[0] {
        b'!' => (InputKind::Important, false, &raw[1..]),
        b'?' => (InputKind::Void, false, &raw[1..]),
        b'%' => (InputKind::Partial, false, &raw[1..]),
        b'+' => (InputKind::Argument, true, &raw[1..]),
        _ => (InputKind::Argument, false, raw),
    };

    if rest.is_empty() {
        return Err(format!("reference `{raw}` has a modifier but no name"));
    }

    let mut segments = rest.split('.');
    let head = segments.next().unwrap();
    let tail: Vec<String> = segments.map(|s| s.to_string()).collect();

    if head == "args" {
        if kind != InputKind::Argument || silent {
            return Err(format!(
                "`args.*` references cannot carry a `{}` modifier",
                raw.as_bytes()[0] as char
            ));
        }
        return match tail.split_first() {
            Some((first, rest)) if first == "*" && rest.is_empty() => {
                Ok(ParsedRef { kind, target: RefTarget::AllArgs, member_path: vec![], silent })
            }
            Some((first, rest)) => Ok(ParsedRef {
                kind,
                target: RefTarget::Arg(first.clone()),
                member_path: rest.to_vec(),
                silent,
            }),
            None => Err("`args` reference must name an argument or `*`".to_string()),
        };
    }

    Ok(ParsedRef { kind, target: RefTarget::Node(head.to_string()), member_path: tail, silent })
}

/// Whether a declared node name marks the node as scope-private (consumable
/// only within the scope that defines it): a trailing `_`.
pub fn is_private(name: &str) -> bool {
    name.ends_with('_')
}

/// Deterministic short name (alias) for a node reference: the base name with
/// any modifier prefix stripped, before member-path and scope suffixing.
///
/// Two references that differ only by modifier (`checkAuth` vs.
/// `!checkAuth`) must resolve to the same dependency-resolver alias so the
/// resolver can tell "the same peer, referenced twice" from "two different
/// peers".
pub fn short_name(raw: &str) -> Result<String, String> {
    let parsed = parse_ref(raw)?;
    match parsed.target {
        RefTarget::Node(n) => Ok(n),
        RefTarget::Arg(n) => Ok(format!("args.{n}")),
        RefTarget::AllArgs => Ok("args.*".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_argument() {
        let r = parse_ref("user").unwrap();
        assert_eq!(r.kind, InputKind::Argument);
        assert_eq!(r.target, RefTarget::Node("user".into()));
        assert!(r.member_path.is_empty());
    }

    #[test]
    fn parses_important_with_member_path() {
        let r = parse_ref("!checkAuth.user.id").unwrap();
        assert_eq!(r.kind, InputKind::Important);
        assert_eq!(r.target, RefTarget::Node("checkAuth".into()));
        assert_eq!(r.member_path, vec!["user".to_string(), "id".to_string()]);
    }

    #[test]
    fn parses_void_and_partial() {
        assert_eq!(parse_ref("?logAccess").unwrap().kind, InputKind::Void);
        assert_eq!(parse_ref("%config").unwrap().kind, InputKind::Partial);
    }

    #[test]
    fn parses_args_reference() {
        let r = parse_ref("args.userId").unwrap();
        assert_eq!(r.target, RefTarget::Arg("userId".into()));

        let r = parse_ref("args.*").unwrap();
        assert_eq!(r.target, RefTarget::AllArgs);
    }

    #[test]
    fn rejects_modifier_on_args_ref() {
        assert!(parse_ref("!args.userId").is_err());
        assert!(parse_ref("+args.userId").is_err());
    }

    #[test]
    fn parses_silent_output_field() {
        let r = parse_ref("+internalCheck").unwrap();
        assert!(r.silent);
        assert_eq!(r.kind, InputKind::Argument);
        assert_eq!(r.target, RefTarget::Node("internalCheck".into()));

        assert!(!parse_ref("internalCheck").unwrap().silent);
    }

    #[test]
    fn detects_private_nodes() {
        assert!(is_private("loadProfile_"));
        assert!(!is_private("loadProfile"));
    }

    #[test]
    fn short_name_strips_modifier_not_member_path() {
        assert_eq!(short_name("!checkAuth").unwrap(), "checkAuth");
        assert_eq!(short_name("checkAuth").unwrap(), "checkAuth");
    }
}
