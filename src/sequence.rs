//! Animation sequencing: turn a style, the content units and a frame budget into an
//! [`AnimationPlan`].
//!
//! Every style is built from a list of distinct *slots* (one mutation each), which is then
//! fitted to the budget: when the budget is large enough every slot is repeated evenly,
//! otherwise optional slots are dropped and the remainder is sampled.

use crate::core::{AnimationPlan, AnimationStyle, ContentUnit, FrameMutation, ScrollOffset, Visibility};

/// Upper bound on partial-text steps per unit for [`AnimationStyle::Typing`].
pub const TYPING_STEP_CAP: usize = 5;

/// Share of a scroll plan spent holding at the top, and again at the bottom.
pub const SCROLL_HOLD_FRACTION: f64 = 0.1;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotKind {
    Lead,
    Unit,
    Hold,
}

#[derive(Clone, Debug)]
struct Slot {
    kind: SlotKind,
    mutation: FrameMutation,
}

/// Build the plan for `style`. Never fails; a `frame_budget` of 0 is treated as 1.
///
/// The result has between 1 and `max(frame_budget, 1)` frames and depends only on its inputs.
#[tracing::instrument(level = "debug", skip(units), fields(units = units.len()))]
pub fn plan(style: AnimationStyle, units: &[ContentUnit], frame_budget: u32) -> AnimationPlan {
    let budget = frame_budget.max(1) as usize;
    let n = units.len();

    let frames = if n == 0 {
        vec![FrameMutation::all(0, Visibility::Full)]
    } else {
        match style {
            AnimationStyle::None => vec![FrameMutation::all(n, Visibility::Full)],
            AnimationStyle::Reveal => fit(reveal_slots(n), budget),
            AnimationStyle::Typing => plan_typing(units, budget),
            AnimationStyle::Scroll => plan_scroll(n, budget),
        }
    };

    tracing::debug!(frames = frames.len(), "planned animation");
    AnimationPlan::new(style, frames).unwrap_or_else(|| AnimationPlan::still(style, n))
}

fn reveal_slots(n: usize) -> Vec<Slot> {
    let mut slots = Vec::with_capacity(n + 2);
    slots.push(Slot {
        kind: SlotKind::Lead,
        mutation: FrameMutation::prefix(n, 0),
    });
    for k in 0..n {
        slots.push(Slot {
            kind: SlotKind::Unit,
            mutation: FrameMutation::prefix(n, k + 1),
        });
    }
    slots.push(Slot {
        kind: SlotKind::Hold,
        mutation: FrameMutation::prefix(n, n),
    });
    slots
}

fn plan_typing(units: &[ContentUnit], budget: usize) -> Vec<FrameMutation> {
    for cap in (2..=TYPING_STEP_CAP).rev() {
        let slots = typing_slots(units, cap);
        if slots.len() <= budget {
            return fit(slots, budget);
        }
    }
    // One step per unit is a plain reveal; let the generic compression take over.
    fit(typing_slots(units, 1), budget)
}

fn typing_slots(units: &[ContentUnit], cap: usize) -> Vec<Slot> {
    let n = units.len();
    let mut slots = vec![Slot {
        kind: SlotKind::Lead,
        mutation: FrameMutation::prefix(n, 0),
    }];

    for (i, unit) in units.iter().enumerate() {
        let len = unit.char_len();
        let steps = cap.min(len.max(1));
        for step in 1..=steps {
            let mut mutation = FrameMutation::prefix(n, i);
            mutation.visibility[i] = if step == steps {
                Visibility::Full
            } else {
                Visibility::Partial {
                    chars: (len * step).div_ceil(steps),
                    cursor: true,
                }
            };
            slots.push(Slot {
                kind: SlotKind::Unit,
                mutation,
            });
        }
    }

    slots.push(Slot {
        kind: SlotKind::Hold,
        mutation: FrameMutation::prefix(n, n),
    });
    slots
}

fn plan_scroll(n: usize, budget: usize) -> Vec<FrameMutation> {
    let hold = (budget as f64 * SCROLL_HOLD_FRACTION).floor() as usize;
    let sweep = budget - 2 * hold;
    let full = FrameMutation::all(n, Visibility::Full);

    let mut frames = Vec::with_capacity(budget);
    frames.extend(std::iter::repeat_n(full.clone().with_scroll(ScrollOffset::TOP), hold));
    for i in 0..sweep {
        let t = if sweep == 1 {
            1.0
        } else {
            i as f64 / (sweep - 1) as f64
        };
        frames.push(full.clone().with_scroll(ScrollOffset(scroll_ease(t))));
    }
    frames.extend(std::iter::repeat_n(full.with_scroll(ScrollOffset::BOTTOM), hold));
    frames
}

/// Quadratic ease-in-out of the sweep position `t`, clamped to `[0, 1]`.
pub fn scroll_ease(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Fit slots to `budget` frames.
///
/// Budget large enough: each slot is repeated `budget / len` times. Otherwise the hold
/// slot goes first, then the lead slot, and if unit slots alone still exceed the budget they
/// are sampled evenly, always keeping the last one.
fn fit(mut slots: Vec<Slot>, budget: usize) -> Vec<FrameMutation> {
    if slots.len() <= budget {
        let per = budget / slots.len();
        return slots
            .into_iter()
            .flat_map(|s| std::iter::repeat_n(s.mutation, per))
            .collect();
    }

    for optional in [SlotKind::Hold, SlotKind::Lead] {
        if slots.len() > budget {
            slots.retain(|s| s.kind != optional);
        }
    }
    if slots.len() <= budget {
        return slots.into_iter().map(|s| s.mutation).collect();
    }

    let len = slots.len();
    (0..budget)
        .map(|k| slots[((k + 1) * len).div_ceil(budget) - 1].mutation.clone())
        .collect()
}

#[cfg(test)]
#[path = "../tests/unit/sequence.rs"]
mod tests;
