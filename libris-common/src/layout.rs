//! Shelf layout validation and planning
//!
//! A layout submission is a flat list of slots. Planning regroups the slots
//! into rows (by `row_index`) and columns (by `(row_index, col_index)`),
//! computes each row's vertical span, and carries over the ids of rows,
//! columns and slots whose keys already existed so that placements keep
//! pointing at the same slot across edits.
//!
//! Planning is pure: stores apply a [`LayoutPlan`] in one critical section or
//! transaction.

use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use crate::models::{LayoutSlotInput, ShelfColumn, ShelfLayout, ShelfRow, ShelfSlot};
use crate::{uuid_utils, Error, Result};

/// Layout with ids reused where keys matched, plus what disappeared
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub layout: ShelfLayout,
    pub removed_slot_ids: Vec<Uuid>,
    pub removed_column_ids: Vec<Uuid>,
    pub removed_row_ids: Vec<Uuid>,
}

/// One full-bleed row, column and slot
pub fn default_layout(shelf_id: Uuid) -> ShelfLayout {
    let row = ShelfRow {
        id: uuid_utils::generate(),
        shelf_id,
        row_index: 0,
        y_start: 0.0,
        y_end: 1.0,
    };
    let column = ShelfColumn {
        id: uuid_utils::generate(),
        row_id: row.id,
        col_index: 0,
        x_start: 0.0,
        x_end: 1.0,
    };
    let slot = ShelfSlot {
        id: uuid_utils::generate(),
        shelf_id,
        row_id: row.id,
        column_id: column.id,
        row_index: 0,
        col_index: 0,
        x_start: 0.0,
        x_end: 1.0,
        y_start: 0.0,
        y_end: 1.0,
    };
    ShelfLayout {
        rows: vec![row],
        columns: vec![column],
        slots: vec![slot],
    }
}

fn check_span(position: usize, slot: &LayoutSlotInput, axis: char, start: f64, end: f64) -> Result<()> {
    let in_range = |v: f64| (0.0..=1.0).contains(&v);
    if !in_range(start) || !in_range(end) {
        return Err(Error::validation(format!(
            "slot {} (row {}, col {}): {axis}_start and {axis}_end must be within [0, 1]",
            position, slot.row_index, slot.col_index
        )));
    }
    if start >= end {
        return Err(Error::validation(format!(
            "slot {} (row {}, col {}): {axis}_start must be less than {axis}_end",
            position, slot.row_index, slot.col_index
        )));
    }
    Ok(())
}

/// Reject the whole submission if any slot is malformed
pub fn validate_slots(slots: &[LayoutSlotInput]) -> Result<()> {
    if slots.is_empty() {
        return Err(Error::validation("layout must contain at least one slot"));
    }

    let mut seen = HashSet::new();
    for (position, slot) in slots.iter().enumerate() {
        if slot.row_index < 0 || slot.col_index < 0 {
            return Err(Error::validation(format!(
                "slot {} (row {}, col {}): row_index and col_index must be non-negative",
                position, slot.row_index, slot.col_index
            )));
        }
        check_span(position, slot, 'x', slot.x_start, slot.x_end)?;
        check_span(position, slot, 'y', slot.y_start, slot.y_end)?;
        if !seen.insert((slot.row_index, slot.col_index)) {
            return Err(Error::validation(format!(
                "slot {} (row {}, col {}): duplicate row/column position",
                position, slot.row_index, slot.col_index
            )));
        }
    }
    Ok(())
}

/// Build the replacement layout for `shelf_id`
pub fn plan_layout(
    shelf_id: Uuid,
    existing: &ShelfLayout,
    input: &[LayoutSlotInput],
) -> Result<LayoutPlan> {
    validate_slots(input)?;

    let old_rows: HashMap<i64, Uuid> = existing.rows.iter().map(|r| (r.row_index, r.id)).collect();
    let row_index_of: HashMap<Uuid, i64> =
        existing.rows.iter().map(|r| (r.id, r.row_index)).collect();
    let old_columns: HashMap<(i64, i64), Uuid> = existing
        .columns
        .iter()
        .filter_map(|c| row_index_of.get(&c.row_id).map(|ri| ((*ri, c.col_index), c.id)))
        .collect();
    let old_slots: HashMap<(i64, i64), Uuid> =
        existing.slots.iter().map(|s| (s.key(), s.id)).collect();

    let mut by_row: BTreeMap<i64, Vec<&LayoutSlotInput>> = BTreeMap::new();
    for slot in input {
        by_row.entry(slot.row_index).or_default().push(slot);
    }

    let mut layout = ShelfLayout::default();
    for (row_index, mut slots) in by_row {
        slots.sort_by_key(|s| s.col_index);
        let y_start = slots.iter().map(|s| s.y_start).fold(f64::INFINITY, f64::min);
        let y_end = slots.iter().map(|s| s.y_end).fold(f64::NEG_INFINITY, f64::max);
        let row = ShelfRow {
            id: old_rows.get(&row_index).copied().unwrap_or_else(uuid_utils::generate),
            shelf_id,
            row_index,
            y_start,
            y_end,
        };

        for slot in slots {
            let key = (row_index, slot.col_index);
            let column = ShelfColumn {
                id: old_columns.get(&key).copied().unwrap_or_else(uuid_utils::generate),
                row_id: row.id,
                col_index: slot.col_index,
                x_start: slot.x_start,
                x_end: slot.x_end,
            };
            layout.slots.push(ShelfSlot {
                id: old_slots.get(&key).copied().unwrap_or_else(uuid_utils::generate),
                shelf_id,
                row_id: row.id,
                column_id: column.id,
                row_index,
                col_index: slot.col_index,
                x_start: slot.x_start,
                x_end: slot.x_end,
                y_start: slot.y_start,
                y_end: slot.y_end,
            });
            layout.columns.push(column);
        }
        layout.rows.push(row);
    }

    let kept_slots: HashSet<Uuid> = layout.slots.iter().map(|s| s.id).collect();
    let kept_columns: HashSet<Uuid> = layout.columns.iter().map(|c| c.id).collect();
    let kept_rows: HashSet<Uuid> = layout.rows.iter().map(|r| r.id).collect();

    Ok(LayoutPlan {
        removed_slot_ids: existing
            .slots
            .iter()
            .map(|s| s.id)
            .filter(|id| !kept_slots.contains(id))
            .collect(),
        removed_column_ids: existing
            .columns
            .iter()
            .map(|c| c.id)
            .filter(|id| !kept_columns.contains(id))
            .collect(),
        removed_row_ids: existing
            .rows
            .iter()
            .map(|r| r.id)
            .filter(|id| !kept_rows.contains(id))
            .collect(),
        layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(row: i64, col: i64, x: (f64, f64), y: (f64, f64)) -> LayoutSlotInput {
        LayoutSlotInput {
            row_index: row,
            col_index: col,
            x_start: x.0,
            x_end: x.1,
            y_start: y.0,
            y_end: y.1,
        }
    }

    #[test]
    fn test_default_layout_is_full_bleed() {
        let shelf_id = Uuid::new_v4();
        let layout = default_layout(shelf_id);
        assert_eq!(layout.slots.len(), 1);
        let s = &layout.slots[0];
        assert_eq!((s.x_start, s.x_end, s.y_start, s.y_end), (0.0, 1.0, 0.0, 1.0));
        assert_eq!(s.row_id, layout.rows[0].id);
        assert_eq!(s.column_id, layout.columns[0].id);
    }

    #[test]
    fn test_validate_rejects_empty_layout() {
        assert!(matches!(validate_slots(&[]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_names_offending_slot() {
        let input = [
            slot(0, 0, (0.0, 0.5), (0.0, 1.0)),
            slot(0, 1, (0.6, 0.5), (0.0, 1.0)),
        ];
        match validate_slots(&input) {
            Err(Error::Validation(msg)) => {
                assert!(msg.contains("slot 1 (row 0, col 1)"), "{}", msg);
                assert!(msg.contains("x_start must be less than x_end"), "{}", msg);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_and_nan() {
        assert!(validate_slots(&[slot(0, 0, (0.0, 1.2), (0.0, 1.0))]).is_err());
        assert!(validate_slots(&[slot(0, 0, (-0.1, 0.5), (0.0, 1.0))]).is_err());
        assert!(validate_slots(&[slot(0, 0, (0.0, 0.5), (f64::NAN, 1.0))]).is_err());
        assert!(validate_slots(&[slot(-1, 0, (0.0, 0.5), (0.0, 1.0))]).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_keys() {
        let input = [
            slot(1, 2, (0.0, 0.5), (0.0, 0.5)),
            slot(1, 2, (0.5, 1.0), (0.0, 0.5)),
        ];
        match validate_slots(&input) {
            Err(Error::Validation(msg)) => assert!(msg.contains("duplicate"), "{}", msg),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_computes_row_spans() {
        let shelf_id = Uuid::new_v4();
        let input = [
            slot(0, 0, (0.0, 0.5), (0.1, 0.4)),
            slot(0, 1, (0.5, 1.0), (0.05, 0.45)),
            slot(1, 0, (0.0, 1.0), (0.5, 0.9)),
        ];
        let plan = plan_layout(shelf_id, &ShelfLayout::default(), &input).unwrap();
        assert_eq!(plan.layout.rows.len(), 2);
        assert_eq!(plan.layout.rows[0].y_start, 0.05);
        assert_eq!(plan.layout.rows[0].y_end, 0.45);
        assert_eq!(plan.layout.rows[1].row_index, 1);
        assert_eq!(plan.layout.columns.len(), 3);
        assert_eq!(plan.layout.slots.len(), 3);
        assert!(plan.removed_slot_ids.is_empty());
    }

    #[test]
    fn test_plan_keeps_ids_for_matching_keys() {
        let shelf_id = Uuid::new_v4();
        let existing = default_layout(shelf_id);
        let old_slot = existing.slots[0].id;
        let old_row = existing.rows[0].id;

        let input = [
            slot(0, 0, (0.0, 0.5), (0.0, 1.0)),
            slot(0, 1, (0.5, 1.0), (0.0, 1.0)),
        ];
        let plan = plan_layout(shelf_id, &existing, &input).unwrap();

        let kept = plan.layout.slots.iter().find(|s| s.key() == (0, 0)).unwrap();
        assert_eq!(kept.id, old_slot);
        assert_eq!(kept.row_id, old_row);
        assert_eq!(kept.x_end, 0.5);
        let fresh = plan.layout.slots.iter().find(|s| s.key() == (0, 1)).unwrap();
        assert_ne!(fresh.id, old_slot);
        assert!(plan.removed_slot_ids.is_empty());
        assert!(plan.removed_row_ids.is_empty());
    }

    #[test]
    fn test_plan_reports_removed_keys() {
        let shelf_id = Uuid::new_v4();
        let existing = default_layout(shelf_id);
        let input = [
            slot(1, 0, (0.0, 0.5), (0.0, 1.0)),
            slot(1, 1, (0.5, 1.0), (0.0, 1.0)),
        ];
        let plan = plan_layout(shelf_id, &existing, &input).unwrap();

        assert_eq!(plan.removed_slot_ids, vec![existing.slots[0].id]);
        assert_eq!(plan.removed_column_ids, vec![existing.columns[0].id]);
        assert_eq!(plan.removed_row_ids, vec![existing.rows[0].id]);
        assert!(plan.layout.slots.iter().all(|s| s.id != existing.slots[0].id));
    }
}
