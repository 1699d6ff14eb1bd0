//! Overload resolution
//!
//! A pure function over member descriptors and argument shapes. Each
//! candidate binds receivers implicitly, named arguments by exact name and
//! positional arguments left to right, skipping an optional parameter when
//! the next parameter scores the argument higher. A vararg consumes every remaining
//! compatible positional argument. Per-argument scores add up; the highest
//! total wins and ties go to the earlier candidate.

use tether_sdk::names;
use tether_sdk::{MemberDesc, ParamDesc, TypeDesc};

/// Argument type equals the parameter type
pub const EXACT: u32 = 8;
/// `null` passed to a nullable parameter
pub const NULL_TO_NULLABLE: u32 = 4;
/// Primitive widening, boxing or unboxing
pub const WIDENING: u32 = 2;
/// One-character string passed to a `char` parameter
pub const CHAR_FROM_STRING: u32 = 2;
/// Argument class assignable to a supertype parameter
pub const ASSIGNABLE: u32 = 1;

/// Shape of one call argument
#[derive(Debug, Clone, PartialEq)]
pub enum ArgKind {
    /// `null`
    Null,
    /// Primitive slot of the given type
    Primitive(TypeDesc),
    /// Object of a concrete class
    Object {
        /// Concrete class name
        class: String,
        /// A string of exactly one character
        char_string: bool,
    },
}

/// One call argument: its shape and, for keyword calls, its name
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Keyword
    pub name: Option<String>,
    /// Shape
    pub kind: ArgKind,
}

impl Argument {
    /// Positional argument
    pub fn positional(kind: ArgKind) -> Self {
        Self { name: None, kind }
    }

    /// Keyword argument
    pub fn named(name: &str, kind: ArgKind) -> Self {
        Self {
            name: Some(name.to_string()),
            kind,
        }
    }

    /// Diagnostic form: `int`, `lang/String`, `null`, `x=int`
    pub fn describe(&self) -> String {
        let kind = match &self.kind {
            ArgKind::Null => "null".to_string(),
            ArgKind::Primitive(ty) => ty.display_name(),
            ArgKind::Object { class, .. } => class.clone(),
        };
        match &self.name {
            Some(name) => format!("{}={}", name, kind),
            None => kind,
        }
    }
}

/// Describe an argument list for [`crate::BridgeError::NoSuchMember`]
pub fn describe_arguments(args: &[Argument]) -> String {
    args.iter().map(Argument::describe).collect::<Vec<_>>().join(", ")
}

/// Class hierarchy queries needed for scoring
pub trait TypeOracle {
    /// Whether instances of `sub` can be passed where `sup` is expected
    fn is_assignable(&self, sub: &str, sup: &str) -> bool;
}

/// How one declared parameter is filled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// The call target (instance or extension receiver)
    Receiver,
    /// Argument at this index
    Arg(usize),
    /// Arguments at these indices, packed into a list
    Vararg(Vec<usize>),
    /// Omitted optional parameter
    Default,
}

/// A candidate that accepted the arguments
#[derive(Debug, Clone)]
pub struct OverloadCandidate<'a> {
    /// Position in the candidate list
    pub index: usize,
    /// The member
    pub member: &'a MemberDesc,
    /// One slot per declared parameter
    pub slots: Vec<Slot>,
    /// Total score
    pub score: u32,
}

/// Pick the best candidate for `args`, or `None` if nothing accepts them
pub fn resolve<'a>(
    candidates: &'a [MemberDesc],
    args: &[Argument],
    oracle: &dyn TypeOracle,
) -> Option<OverloadCandidate<'a>> {
    let mut best: Option<OverloadCandidate<'a>> = None;
    for (index, member) in candidates.iter().enumerate() {
        let Some((slots, score)) = bind(member, args, oracle) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(OverloadCandidate {
                index,
                member,
                slots,
                score,
            });
        }
    }
    best
}

/// Bind `args` to `member`'s parameters, returning the slots and total score
pub fn bind(member: &MemberDesc, args: &[Argument], oracle: &dyn TypeOracle) -> Option<(Vec<Slot>, u32)> {
    let params = &member.params;
    let mut slots: Vec<Option<Slot>> = params
        .iter()
        .map(|p| p.is_receiver().then_some(Slot::Receiver))
        .collect();
    let mut total = 0;

    // Keyword arguments: exact name, each parameter at most once
    for (i, arg) in args.iter().enumerate() {
        let Some(name) = &arg.name else { continue };
        let index = params
            .iter()
            .position(|p| !p.is_receiver() && p.name.as_deref() == Some(name.as_str()))?;
        if slots[index].is_some() {
            return None;
        }
        total += score(&arg.kind, &params[index].ty, oracle)?;
        slots[index] = Some(if params[index].vararg {
            Slot::Vararg(vec![i])
        } else {
            Slot::Arg(i)
        });
    }

    // Positional arguments, left to right
    let positional: Vec<usize> = args
        .iter()
        .enumerate()
        .filter(|(_, a)| a.name.is_none())
        .map(|(i, _)| i)
        .collect();
    let open: Vec<usize> = (0..params.len()).filter(|&i| slots[i].is_none()).collect();
    let mut next = 0;
    for (k, &pi) in open.iter().enumerate() {
        let param = &params[pi];
        if param.vararg {
            let mut taken = Vec::new();
            while let Some(&ai) = positional.get(next) {
                let Some(s) = score(&args[ai].kind, &param.ty, oracle) else {
                    break;
                };
                total += s;
                taken.push(ai);
                next += 1;
            }
            slots[pi] = Some(Slot::Vararg(taken));
            continue;
        }
        let Some(&ai) = positional.get(next) else {
            if param.optional {
                slots[pi] = Some(Slot::Default);
                continue;
            }
            return None;
        };
        let here = score(&args[ai].kind, &param.ty, oracle);
        if param.optional {
            let ahead = score_next(&open[k + 1..], params, &args[ai], oracle);
            if ahead.is_some_and(|a| here.map_or(true, |h| a > h)) {
                slots[pi] = Some(Slot::Default);
                continue;
            }
        }
        let s = here?;
        total += s;
        slots[pi] = Some(Slot::Arg(ai));
        next += 1;
    }
    if next < positional.len() {
        return None;
    }
    let slots = slots.into_iter().collect::<Option<Vec<Slot>>>()?;
    Some((slots, total))
}

/// Score of `arg` against the next open parameter, if it accepts it
fn score_next(rest: &[usize], params: &[ParamDesc], arg: &Argument, oracle: &dyn TypeOracle) -> Option<u32> {
    rest.first().and_then(|&i| score(&arg.kind, &params[i].ty, oracle))
}

/// Score of passing `arg` where `ty` is declared, `None` if incompatible
pub fn score(arg: &ArgKind, ty: &TypeDesc, oracle: &dyn TypeOracle) -> Option<u32> {
    match (arg, ty) {
        (_, TypeDesc::Void) => None,
        (ArgKind::Null, TypeDesc::Object { nullable: true, .. }) => Some(NULL_TO_NULLABLE),
        (ArgKind::Null, TypeDesc::Object { .. }) => Some(ASSIGNABLE),
        (ArgKind::Null, _) => None,

        (ArgKind::Primitive(from), to) if to.is_primitive() => {
            if from == to {
                Some(EXACT)
            } else if widens(from, to) {
                Some(WIDENING)
            } else {
                None
            }
        }
        (ArgKind::Primitive(from), TypeDesc::Object { class, .. }) => {
            let boxed = boxed_name(from)?;
            if class.as_str() == boxed {
                Some(WIDENING)
            } else if oracle.is_assignable(boxed, class) {
                Some(ASSIGNABLE)
            } else {
                None
            }
        }
        (ArgKind::Primitive(_), _) => None,

        (ArgKind::Object { class, .. }, TypeDesc::Object { class: to, .. }) => {
            if class == to {
                Some(EXACT)
            } else if oracle.is_assignable(class, to) {
                Some(ASSIGNABLE)
            } else {
                None
            }
        }
        (ArgKind::Object { char_string: true, .. }, TypeDesc::Char) => Some(CHAR_FROM_STRING),
        (ArgKind::Object { class, .. }, to) => {
            // Unboxing, optionally followed by widening
            let unboxed = unboxed_type(class)?;
            (unboxed == *to || widens(&unboxed, to)).then_some(WIDENING)
        }
    }
}

/// Primitive widening conversions
pub fn widens(from: &TypeDesc, to: &TypeDesc) -> bool {
    use TypeDesc::*;
    matches!(
        (from, to),
        (Byte, Short | Int | Long | Float | Double)
            | (Short, Int | Long | Float | Double)
            | (Char, Int | Long | Float | Double)
            | (Int, Long | Float | Double)
            | (Long, Float | Double)
            | (Float, Double)
    )
}

fn boxed_name(ty: &TypeDesc) -> Option<&'static str> {
    Some(match ty {
        TypeDesc::Bool => names::BOOLEAN,
        TypeDesc::Byte => names::BYTE,
        TypeDesc::Char => names::CHARACTER,
        TypeDesc::Short => names::SHORT,
        TypeDesc::Int => names::INTEGER,
        TypeDesc::Long => names::LONG,
        TypeDesc::Float => names::FLOAT,
        TypeDesc::Double => names::DOUBLE,
        _ => return None,
    })
}

fn unboxed_type(class: &str) -> Option<TypeDesc> {
    Some(match class {
        names::BOOLEAN => TypeDesc::Bool,
        names::BYTE => TypeDesc::Byte,
        names::CHARACTER => TypeDesc::Char,
        names::SHORT => TypeDesc::Short,
        names::INTEGER => TypeDesc::Int,
        names::LONG => TypeDesc::Long,
        names::FLOAT => TypeDesc::Float,
        names::DOUBLE => TypeDesc::Double,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_sdk::{ClassRef, MemberId, MemberKind};

    /// Everything is a `lang/Object`; `lang/Integer` is a `lang/Number`
    struct Flat;

    impl TypeOracle for Flat {
        fn is_assignable(&self, sub: &str, sup: &str) -> bool {
            sub == sup
                || sup == names::OBJECT
                || (sup == "lang/Number" && matches!(sub, names::INTEGER | names::LONG))
        }
    }

    fn function(index: u32, name: &str, params: Vec<ParamDesc>) -> MemberDesc {
        let mut all = vec![ParamDesc::instance("test/Calc")];
        all.extend(params);
        MemberDesc {
            id: MemberId {
                class: ClassRef::new(1),
                index,
            },
            name: name.to_string(),
            kind: MemberKind::Function,
            is_static: false,
            params: all,
            return_type: TypeDesc::Int,
        }
    }

    fn int() -> Argument {
        Argument::positional(ArgKind::Primitive(TypeDesc::Int))
    }

    fn string(s: &str) -> Argument {
        Argument::positional(ArgKind::Object {
            class: names::STRING.to_string(),
            char_string: s.chars().count() == 1,
        })
    }

    fn null() -> Argument {
        Argument::positional(ArgKind::Null)
    }

    #[test]
    fn test_arity_selects_overload() {
        let candidates = vec![
            function(0, "intFunc", vec![ParamDesc::value("a", TypeDesc::Int)]),
            function(
                1,
                "intFunc",
                vec![
                    ParamDesc::value("a", TypeDesc::Int),
                    ParamDesc::value("b", TypeDesc::Int),
                ],
            ),
        ];
        let one = resolve(&candidates, &[int()], &Flat).unwrap();
        assert_eq!(one.index, 0);
        let two = resolve(&candidates, &[int(), int()], &Flat).unwrap();
        assert_eq!(two.index, 1);
        assert_eq!(two.slots, vec![Slot::Receiver, Slot::Arg(0), Slot::Arg(1)]);
        assert_eq!(two.score, 2 * EXACT);
    }

    #[test]
    fn test_exact_beats_widening() {
        let candidates = vec![
            function(0, "f", vec![ParamDesc::value("x", TypeDesc::Long)]),
            function(1, "f", vec![ParamDesc::value("x", TypeDesc::Int)]),
        ];
        let best = resolve(&candidates, &[int()], &Flat).unwrap();
        assert_eq!(best.index, 1);
        assert_eq!(best.score, EXACT);
    }

    #[test]
    fn test_tie_goes_to_first() {
        let candidates = vec![
            function(0, "f", vec![ParamDesc::value("x", TypeDesc::Long)]),
            function(1, "f", vec![ParamDesc::value("x", TypeDesc::Double)]),
        ];
        for _ in 0..10 {
            assert_eq!(resolve(&candidates, &[int()], &Flat).unwrap().index, 0);
        }
    }

    #[test]
    fn test_null_disqualifies_primitive() {
        let candidates = vec![
            function(0, "f", vec![ParamDesc::value("x", TypeDesc::Int)]),
            function(1, "f", vec![ParamDesc::value("x", TypeDesc::nullable(names::STRING))]),
        ];
        let best = resolve(&candidates, &[null()], &Flat).unwrap();
        assert_eq!(best.index, 1);
        assert_eq!(best.score, NULL_TO_NULLABLE);

        let only_int = &candidates[..1];
        assert!(resolve(only_int, &[null()], &Flat).is_none());
    }

    #[test]
    fn test_char_from_single_char_string() {
        let candidates = vec![function(0, "f", vec![ParamDesc::value("c", TypeDesc::Char)])];
        let best = resolve(&candidates, &[string("x")], &Flat).unwrap();
        assert_eq!(best.score, CHAR_FROM_STRING);
        assert!(resolve(&candidates, &[string("xy")], &Flat).is_none());
    }

    #[test]
    fn test_assignable_supertype() {
        let candidates = vec![
            function(0, "f", vec![ParamDesc::value("o", TypeDesc::object(names::OBJECT))]),
            function(1, "f", vec![ParamDesc::value("s", TypeDesc::object(names::STRING))]),
        ];
        let best = resolve(&candidates, &[string("hello")], &Flat).unwrap();
        assert_eq!(best.index, 1);
        let boxed = resolve(&candidates[..1], &[int()], &Flat).unwrap();
        assert_eq!(boxed.score, ASSIGNABLE);
    }

    #[test]
    fn test_optional_skipped_by_lookahead() {
        let candidates = vec![function(
            0,
            "f",
            vec![
                ParamDesc::optional("label", TypeDesc::object(names::STRING)),
                ParamDesc::value("count", TypeDesc::Int),
            ],
        )];
        let best = resolve(&candidates, &[int()], &Flat).unwrap();
        assert_eq!(best.slots, vec![Slot::Receiver, Slot::Default, Slot::Arg(0)]);

        let both = resolve(&candidates, &[string("a"), int()], &Flat).unwrap();
        assert_eq!(both.slots, vec![Slot::Receiver, Slot::Arg(0), Slot::Arg(1)]);
    }

    #[test]
    fn test_optional_skipped_for_better_match() {
        let candidates = vec![function(
            0,
            "f",
            vec![
                ParamDesc::optional("label", TypeDesc::nullable(names::OBJECT)),
                ParamDesc::value("count", TypeDesc::Int),
            ],
        )];
        let best = resolve(&candidates, &[int()], &Flat).unwrap();
        assert_eq!(best.slots, vec![Slot::Receiver, Slot::Default, Slot::Arg(0)]);
        assert_eq!(best.score, EXACT);

        // A string only fits the optional parameter
        let both = resolve(&candidates, &[string("a"), int()], &Flat).unwrap();
        assert_eq!(both.slots, vec![Slot::Receiver, Slot::Arg(0), Slot::Arg(1)]);
        assert_eq!(both.score, ASSIGNABLE + EXACT);
    }

    #[test]
    fn test_optional_kept_when_it_scores_higher() {
        let candidates = vec![function(
            0,
            "f",
            vec![
                ParamDesc::optional("a", TypeDesc::Int),
                ParamDesc::value("b", TypeDesc::Long),
            ],
        )];
        let best = resolve(&candidates, &[int(), int()], &Flat).unwrap();
        assert_eq!(best.slots, vec![Slot::Receiver, Slot::Arg(0), Slot::Arg(1)]);
        assert_eq!(best.score, EXACT + WIDENING);
    }

    #[test]
    fn test_trailing_optional_defaults() {
        let candidates = vec![function(
            0,
            "f",
            vec![
                ParamDesc::value("a", TypeDesc::Int),
                ParamDesc::optional("b", TypeDesc::Int),
            ],
        )];
        let best = resolve(&candidates, &[int()], &Flat).unwrap();
        assert_eq!(best.slots, vec![Slot::Receiver, Slot::Arg(0), Slot::Default]);
    }

    #[test]
    fn test_vararg_is_greedy() {
        let candidates = vec![function(
            0,
            "sum",
            vec![
                ParamDesc::value("first", TypeDesc::Int),
                ParamDesc::vararg("rest", TypeDesc::Int),
            ],
        )];
        let best = resolve(&candidates, &[int(), int(), int(), int()], &Flat).unwrap();
        assert_eq!(
            best.slots,
            vec![Slot::Receiver, Slot::Arg(0), Slot::Vararg(vec![1, 2, 3])]
        );
        let empty = resolve(&candidates, &[int()], &Flat).unwrap();
        assert_eq!(empty.slots[2], Slot::Vararg(vec![]));
        assert!(resolve(&candidates, &[int(), string("x")], &Flat).is_none());
    }

    #[test]
    fn test_named_arguments_exact() {
        let candidates = vec![function(
            0,
            "f",
            vec![
                ParamDesc::value("a", TypeDesc::Int),
                ParamDesc::optional("b", TypeDesc::Int),
                ParamDesc::value("c", TypeDesc::object(names::STRING)),
            ],
        )];
        let args = vec![
            Argument::named("c", ArgKind::Object {
                class: names::STRING.to_string(),
                char_string: false,
            }),
            Argument::named("a", ArgKind::Primitive(TypeDesc::Int)),
        ];
        let best = resolve(&candidates, &args, &Flat).unwrap();
        assert_eq!(
            best.slots,
            vec![Slot::Receiver, Slot::Arg(1), Slot::Default, Slot::Arg(0)]
        );

        let unknown = vec![Argument::named("z", ArgKind::Primitive(TypeDesc::Int))];
        assert!(resolve(&candidates, &unknown, &Flat).is_none());
    }

    #[test]
    fn test_too_many_arguments() {
        let candidates = vec![function(0, "f", vec![ParamDesc::value("a", TypeDesc::Int)])];
        assert!(resolve(&candidates, &[int(), int()], &Flat).is_none());
    }

    #[test]
    fn test_unboxing_scores_as_widening() {
        let integer = Argument::positional(ArgKind::Object {
            class: names::INTEGER.to_string(),
            char_string: false,
        });
        assert_eq!(score(&integer.kind, &TypeDesc::Int, &Flat), Some(WIDENING));
        assert_eq!(score(&integer.kind, &TypeDesc::Long, &Flat), Some(WIDENING));
        assert_eq!(score(&integer.kind, &TypeDesc::Bool, &Flat), None);
    }

    #[test]
    fn test_describe_arguments() {
        let args = vec![int(), null(), Argument::named("s", ArgKind::Primitive(TypeDesc::Char))];
        assert_eq!(describe_arguments(&args), "int, null, s=char");
    }
}
