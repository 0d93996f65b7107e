//! Exception handler range ordering
//!
//! Produces a verifier-valid total order over handler ranges measured in
//! resolved instruction offsets: disjoint ranges order by position, properly
//! nested ranges narrower-first, and remaining ties fall back to original
//! declaration order. Ranges that overlap without proper nesting are
//! rejected; a silent choice there would change which handler activates for
//! a given fault.

use crate::error::TransformError;
use std::cmp::Ordering;
use weft_classfile::{label_positions, Handler, MethodBody};

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn disjoint(self, other: Span) -> bool {
        self.end <= other.start || other.end <= self.start
    }

    fn contains(self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    fn len(self) -> usize {
        self.end - self.start
    }
}

/// Sort a body's handlers into dispatch order, in place.
pub fn order_handlers(
    class: &str,
    method: &str,
    body: &mut MethodBody,
) -> Result<(), TransformError> {
    if body.handlers.len() < 2 {
        return Ok(());
    }
    let positions = label_positions(body)?;
    let span_of = |h: &Handler| -> Result<Span, TransformError> {
        let lookup = |label| {
            positions
                .get(&label)
                .copied()
                .ok_or(weft_classfile::BodyError::UndefinedLabel {
                    label,
                    referent: "handler".to_string(),
                })
        };
        Ok(Span {
            start: lookup(h.start)?,
            end: lookup(h.end)?,
        })
    };

    let mut spans = Vec::with_capacity(body.handlers.len());
    for h in &body.handlers {
        spans.push(span_of(h)?);
    }

    // Crossing ranges are a composition defect, checked before any ordering.
    for i in 0..spans.len() {
        for j in i + 1..spans.len() {
            let (a, b) = (spans[i], spans[j]);
            if !a.disjoint(b) && !a.contains(b) && !b.contains(a) {
                return Err(TransformError::CrossingHandlers {
                    class: class.to_string(),
                    method: method.to_string(),
                    a_start: a.start,
                    a_end: a.end,
                    b_start: b.start,
                    b_end: b.end,
                });
            }
        }
    }

    let mut indexed: Vec<(Handler, Span)> =
        body.handlers.drain(..).zip(spans).collect();
    indexed.sort_by(|(ha, a), (hb, b)| {
        if a.disjoint(*b) {
            return a.start.cmp(&b.start);
        }
        match a.len().cmp(&b.len()) {
            Ordering::Equal => ha.order.cmp(&hb.order),
            narrower_first => narrower_first,
        }
    });
    body.handlers = indexed.into_iter().map(|(h, _)| h).collect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_classfile::{Insn, Label};

    fn handler(start: u32, end: u32, order: u32) -> Handler {
        Handler {
            start: Label(start),
            end: Label(end),
            target: Label(9),
            catch_type: None,
            order,
        }
    }

    fn body_with(handlers: Vec<Handler>) -> MethodBody {
        // Labels 0..=9 at instruction indexes 0..=9.
        MethodBody {
            insns: (0..10).map(|i| Insn::Label(Label(i))).collect(),
            handlers,
            ..Default::default()
        }
    }

    fn ordered(handlers: Vec<Handler>) -> Vec<u32> {
        let mut body = body_with(handlers);
        order_handlers("t/C", "m()V", &mut body).unwrap();
        body.handlers.iter().map(|h| h.order).collect()
    }

    #[test]
    fn disjoint_ranges_order_by_position() {
        assert_eq!(
            ordered(vec![handler(5, 7, 0), handler(1, 3, 1)]),
            vec![1, 0]
        );
    }

    #[test]
    fn nested_ranges_order_narrower_first() {
        assert_eq!(
            ordered(vec![handler(0, 8, 0), handler(2, 4, 1)]),
            vec![1, 0]
        );
    }

    #[test]
    fn equal_ranges_keep_declaration_order() {
        assert_eq!(
            ordered(vec![handler(2, 5, 0), handler(2, 5, 1)]),
            vec![0, 1]
        );
    }

    #[test]
    fn ordering_is_deterministic_across_input_orders() {
        let a = ordered(vec![handler(0, 8, 0), handler(2, 4, 1), handler(8, 9, 2)]);
        let b = ordered(vec![handler(8, 9, 2), handler(0, 8, 0), handler(2, 4, 1)]);
        assert_eq!(a, vec![1, 0, 2]);
        assert_eq!(b, vec![1, 0, 2]);
    }

    #[test]
    fn crossing_ranges_rejected() {
        let mut body = body_with(vec![handler(0, 5, 0), handler(3, 8, 1)]);
        assert!(matches!(
            order_handlers("t/C", "m()V", &mut body),
            Err(TransformError::CrossingHandlers { .. })
        ));
    }
}
