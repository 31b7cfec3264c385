/*!
# Selectors

A selector is an ordered list of [`SelectorItem`]s read right to left
against a call stack. The last item must match the innermost frame of the
matched chain and every earlier item must match some frame further out.
Frames in between are skipped, so only relative order matters.

## Specificity

When several selectors match the same stack they are ranked by walking both
of them outward in lockstep. The first frame where exactly one side matches
decides: that side anchors closer to the call site and wins. If one side
runs out of items first, the side that still needs outer frames is the more
specific one.
*/

pub mod item;
pub mod poset;

use std::{cmp::Ordering, fmt};

pub use item::{FramePattern, SelectorItem};

use crate::{signature::Kwargs, stack::Stack};

/// Values captured by one selector item from the frame it matched
pub type Captures = Kwargs;

/// Ordered pattern over a call stack
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    items: Vec<SelectorItem>,
}

impl Selector {
    pub fn new(items: Vec<SelectorItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[SelectorItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Innermost item, which names the rule's target
    pub fn last(&self) -> Option<&SelectorItem> {
        self.items.last()
    }

    /// Match against a stack, returning captures ordered outer to inner
    pub fn matches(&self, stack: &Stack) -> Option<Vec<Captures>> {
        let Some(mut cursor) = self.items.len().checked_sub(1) else {
            // Empty selector always matches
            return Some(Vec::new());
        };

        let mut captures = Vec::with_capacity(self.items.len());
        for frame in stack.iter() {
            let item = &self.items[cursor];
            if item.matches(frame) {
                captures.push(item.capture(frame));
                if cursor == 0 {
                    captures.reverse();
                    return Some(captures);
                }
                cursor -= 1;
            }
        }
        None
    }

    /// Compare specificity relative to one stack both selectors match
    ///
    /// `Less` means `self` is less specific than `other`. Comparing a
    /// selector that does not match the stack gives an arbitrary answer.
    pub fn compare(&self, other: &Selector, stack: &Stack) -> Ordering {
        let mut a = self.items.len().checked_sub(1);
        let mut b = other.items.len().checked_sub(1);

        for frame in stack.iter() {
            let (ai, bi) = match (a, b) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(ai), Some(bi)) => (ai, bi),
            };

            match (self.items[ai].matches(frame), other.items[bi].matches(frame)) {
                (false, false) => continue,
                (true, true) => {
                    a = ai.checked_sub(1);
                    b = bi.checked_sub(1);
                }
                // other has the lower-level match
                (false, true) => return Ordering::Less,
                (true, false) => return Ordering::Greater,
            }
        }
        Ordering::Equal
    }

    /// Stack-free comparison by tail-suffix extension
    ///
    /// `Some(Greater)` if `self` extends `other` with extra outer items,
    /// `Some(Less)` if `other` extends `self`, `Some(Equal)` for the same
    /// item sequence and `None` when the two are unrelated. Argument-match
    /// payloads are ignored.
    pub fn generic_compare(&self, other: &Selector) -> Option<Ordering> {
        let shared = self
            .items
            .iter()
            .rev()
            .zip(other.items.iter().rev())
            .take_while(|(a, b)| a.same_anchor(b))
            .count();

        if shared < self.items.len().min(other.items.len()) {
            // Term mismatch. No sub-selector relation
            return None;
        }
        Some(self.items.len().cmp(&other.items.len()))
    }

    /// Which selectors match the stack
    pub fn all_matches(selectors: &[Selector], stack: &Stack) -> Vec<bool> {
        selectors.iter().map(|s| s.matches(stack).is_some()).collect()
    }

    /// Indices of the matching selectors, least specific first
    pub fn sort(selectors: &[Selector], stack: &Stack) -> Vec<usize> {
        let matching: Vec<(usize, &Selector)> = selectors
            .iter()
            .enumerate()
            .filter(|(_, selector)| selector.matches(stack).is_some())
            .collect();
        order_by_specificity(matching, stack, |(_, selector)| *selector)
            .into_iter()
            .map(|(i, _)| i)
            .collect()
    }
}

/// Stable ordering of matched entries by specificity, least specific first
///
/// Insertion keeps equal entries in registration order and never requires
/// the comparison to be a total order over unrelated inputs.
pub(crate) fn order_by_specificity<T>(
    entries: Vec<T>,
    stack: &Stack,
    selector: impl Fn(&T) -> &Selector,
) -> Vec<T> {
    let mut ordered: Vec<T> = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut position = ordered.len();
        while position > 0
            && selector(&ordered[position - 1]).compare(selector(&entry), stack) == Ordering::Greater
        {
            position -= 1;
        }
        ordered.insert(position, entry);
    }
    ordered
}

impl From<Vec<SelectorItem>> for Selector {
    fn from(items: Vec<SelectorItem>) -> Self {
        Self::new(items)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, " > ")?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        class::ClassRef,
        context::ContextRef,
        signature::{kwargs, Signature},
        stack::{CallableRef, Frame},
    };

    struct Fixture {
        a: CallableRef,
        b: CallableRef,
        c: CallableRef,
        greet: CallableRef,
    }

    fn fixture() -> Fixture {
        Fixture {
            a: CallableRef::new("a"),
            b: CallableRef::new("b"),
            c: CallableRef::new("c"),
            greet: CallableRef::new("greet"),
        }
    }

    fn sel(items: &[&CallableRef]) -> Selector {
        Selector::new(items.iter().map(|c| SelectorItem::callable(c)).collect())
    }

    /// Stack from frames listed innermost first
    fn stack(frames: &[&CallableRef]) -> Stack {
        Stack::new(frames.iter().map(|c| c.frame()).collect())
    }

    #[test]
    fn test_match_skips_intervening_frames() {
        let f = fixture();
        let selector = sel(&[&f.a, &f.b]);
        assert!(selector.matches(&stack(&[&f.b, &f.c, &f.a])).is_some());
        assert!(selector.matches(&stack(&[&f.b, &f.c])).is_none());
        // Order matters: A must be outside B
        assert!(selector.matches(&stack(&[&f.a, &f.b])).is_none());
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let f = fixture();
        assert_eq!(Selector::default().matches(&Stack::default()), Some(Vec::new()));
        assert_eq!(Selector::default().matches(&stack(&[&f.a])), Some(Vec::new()));
    }

    #[test]
    fn test_captures_are_outer_to_inner() {
        let app = CallableRef::new("app");
        let greet = CallableRef::new("greet");
        let stack = Stack::new(vec![
            greet
                .frame()
                .with_args(vec![crate::Value::from("me")], Kwargs::new())
                .with_signature(Arc::new(Signature::new().param("name").with_default("greeting", "Hello"))),
            app.frame().with_local("user", "bob"),
        ]);

        let captures = sel(&[&app, &greet]).matches(&stack).unwrap();
        assert_eq!(captures.len(), 2);
        assert_eq!(captures[0]["user"], crate::Value::from("bob"));
        assert_eq!(captures[1], kwargs([("name", "me"), ("greeting", "Hello")]));
    }

    #[test]
    fn test_longer_chain_wins() {
        let f = fixture();
        let caller_x = CallableRef::new("callerX");
        let short = sel(&[&f.greet]);
        let long = sel(&[&caller_x, &f.greet]);
        let s = stack(&[&f.greet, &caller_x]);

        assert_eq!(short.compare(&long, &s), Ordering::Less);
        assert_eq!(long.compare(&short, &s), Ordering::Greater);
        assert_eq!(short.compare(&short, &s), Ordering::Equal);
    }

    #[test]
    fn test_lower_level_anchor_wins() {
        let f = fixture();
        // stack: greet <- b <- a
        let s = stack(&[&f.greet, &f.b, &f.a]);
        let via_a = sel(&[&f.a, &f.greet]);
        let via_b = sel(&[&f.b, &f.greet]);

        assert_eq!(via_b.compare(&via_a, &s), Ordering::Greater);
        assert_eq!(via_a.compare(&via_b, &s), Ordering::Less);

        // A three-item chain through the outer frame still loses to b at b's frame
        let long = sel(&[&f.a, &f.a, &f.greet]);
        let s2 = stack(&[&f.greet, &f.b, &f.a, &f.a]);
        assert_eq!(via_b.compare(&long, &s2), Ordering::Greater);
    }

    #[test]
    fn test_order_is_antisymmetric() {
        let f = fixture();
        let s = stack(&[&f.greet, &f.c, &f.b, &f.a]);
        let selectors = vec![
            sel(&[&f.greet]),
            sel(&[&f.a, &f.greet]),
            sel(&[&f.b, &f.greet]),
            sel(&[&f.a, &f.b, &f.greet]),
            sel(&[&f.c, &f.greet]),
        ];
        for x in &selectors {
            for y in &selectors {
                assert_eq!(x.compare(y, &s), y.compare(x, &s).reverse(), "{x} vs {y}");
            }
        }
    }

    #[test]
    fn test_sort_least_specific_first() {
        let f = fixture();
        let s = stack(&[&f.greet, &f.c, &f.b, &f.a]);
        let selectors = vec![
            sel(&[&f.c, &f.greet]),
            sel(&[&f.greet]),
            sel(&[&f.b, &f.greet]),
            sel(&[&f.a, &f.c]),
            sel(&[&f.a, &f.b, &f.greet]),
        ];
        // Anchoring only needs the last item on some frame, not on the innermost one
        assert_eq!(
            Selector::all_matches(&selectors, &s),
            vec![true, true, true, true, true]
        );

        let order = Selector::sort(&selectors[..3], &s);
        assert_eq!(order, vec![1, 2, 0]);

        let order = Selector::sort(&[sel(&[&f.b, &f.greet]), sel(&[&f.a, &f.b, &f.greet])], &s);
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_sort_excludes_non_matching() {
        let f = fixture();
        let s = stack(&[&f.greet, &f.a]);
        let selectors = vec![sel(&[&f.b, &f.greet]), sel(&[&f.greet])];
        assert_eq!(Selector::sort(&selectors, &s), vec![1]);
    }

    #[test]
    fn test_equal_selectors_keep_registration_order() {
        let f = fixture();
        let s = stack(&[&f.greet, &f.a]);
        let entries = vec![("first", sel(&[&f.a, &f.greet])), ("second", sel(&[&f.a, &f.greet]))];
        let ordered = order_by_specificity(entries, &s, |(_, selector)| selector);
        let names: Vec<&str> = ordered.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_context_and_method_items() {
        let f = fixture();
        let debug = ContextRef::new("Debug");
        let suite = ClassRef::new("TestClasses");
        let s = Stack::new(vec![
            f.greet.frame(),
            f.b.frame(),
            Frame::method(&suite, "test_class_override"),
        ]);

        let by_method = Selector::new(vec![
            SelectorItem::method(&suite, "test_class_override"),
            SelectorItem::callable(&f.greet),
        ]);
        assert!(by_method.matches(&s).is_some());

        let by_context = Selector::new(vec![SelectorItem::context(&debug), SelectorItem::callable(&f.greet)]);
        assert!(by_context.matches(&s).is_none());
        debug.scope(|| {
            assert!(by_context.matches(&s).is_some());
            // The context item is satisfied at b, before the method frame is reached
            assert_eq!(by_context.compare(&by_method, &s), Ordering::Greater);
        });
    }

    #[test]
    fn test_context_matches_above_outermost_call() {
        let f = fixture();
        let formal = ContextRef::new("Formal");
        let by_context = Selector::new(vec![SelectorItem::context(&formal), SelectorItem::callable(&f.greet)]);

        let _greet = f.greet.enter();
        assert!(by_context.matches(&Stack::current()).is_none());
        formal.scope(|| {
            let captures = by_context.matches(&Stack::current()).unwrap();
            assert_eq!(captures.len(), 2);
            assert!(captures[0].is_empty());
        });

        // The root frame never satisfies a callable item
        assert!(sel(&[&f.a, &f.greet]).matches(&Stack::current()).is_none());
    }

    #[test]
    fn test_generic_compare() {
        let f = fixture();
        let foo = &f.a;
        let bar = &f.b;
        let baz = &f.c;
        assert_eq!(sel(&[foo]).generic_compare(&sel(&[foo])), Some(Ordering::Equal));
        assert_eq!(sel(&[baz, foo]).generic_compare(&sel(&[foo])), Some(Ordering::Greater));
        assert_eq!(sel(&[foo]).generic_compare(&sel(&[baz, foo])), Some(Ordering::Less));
        assert_eq!(sel(&[foo]).generic_compare(&sel(&[bar])), None);
        assert_eq!(sel(&[bar, foo]).generic_compare(&sel(&[baz, foo])), None);
    }

    #[test]
    fn test_generic_compare_ignores_match_payload() {
        let f = fixture();
        let narrowed = Selector::new(vec![
            SelectorItem::callable(&f.a),
            SelectorItem::matching(SelectorItem::callable(&f.greet), kwargs([("x", 5)])),
        ]);
        assert_eq!(narrowed.generic_compare(&sel(&[&f.greet])), Some(Ordering::Greater));
        assert_eq!(narrowed.generic_compare(&sel(&[&f.a, &f.greet])), Some(Ordering::Equal));
    }

    #[test]
    fn test_display() {
        let f = fixture();
        assert_eq!(sel(&[&f.a, &f.greet]).to_string(), "a > greet");
    }
}
