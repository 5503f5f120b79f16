use chrono::{
  NaiveDate,
  Weekday
};

use crate::drag::DropTarget;
use crate::grid::{
  GridError,
  GridSlot,
  MonthCursor,
  month_grid
};
use crate::item::{
  ContainerId,
  ItemKey
};
use crate::store::BoardState;

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct CalendarCell {
  pub slot:  GridSlot,
  pub items: Vec<ItemKey>
}

impl CalendarCell {
  pub fn date(
    &self
  ) -> Option<NaiveDate> {
    self.slot.day().map(|day| day.date)
  }
}

/// One month of the calendar with the
/// board's items placed on their days.
#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct CalendarMonth {
  pub cursor:     MonthCursor,
  pub week_start: Weekday,
  pub cells:      Vec<CalendarCell>
}

impl CalendarMonth {
  pub fn project(
    cursor: MonthCursor,
    today: NaiveDate,
    week_start: Weekday,
    state: &BoardState
  ) -> Result<Self, GridError> {
    let slots = month_grid(
      cursor.year,
      cursor.month0,
      today,
      week_start
    )?;
    let cells = slots
      .into_iter()
      .map(|slot| {
        let items = slot
          .day()
          .map(|day| {
            state.day(day.date).to_vec()
          })
          .unwrap_or_default();
        CalendarCell { slot, items }
      })
      .collect();

    Ok(Self {
      cursor,
      week_start,
      cells
    })
  }

  pub fn cell(
    &self,
    date: NaiveDate
  ) -> Option<&CalendarCell> {
    self.cells.iter().find(|cell| {
      cell.date() == Some(date)
    })
  }

  pub fn rows(
    &self
  ) -> impl Iterator<Item = &[CalendarCell]>
  {
    self.cells.chunks(7)
  }

  /// Drop target for a day shown in
  /// this month. Placeholders and other
  /// months' days are not targets.
  pub fn drop_target(
    &self,
    date: NaiveDate,
    index: usize
  ) -> Option<DropTarget> {
    if !self.cursor.contains(date) {
      return None;
    }
    let cell = self.cell(date)?;
    Some(DropTarget {
      container: ContainerId::Day(date),
      index:     index
        .min(cell.items.len())
    })
  }
}

#[cfg(test)]
mod tests {
  use tack_shared::{
    ItemRecord,
    Variant
  };

  use super::*;
  use crate::store::BoardStore;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn campaign(
    id: &str,
    day: &str
  ) -> ItemRecord {
    ItemRecord {
      id:             id.to_string(),
      variant:        Variant::Campaign,
      title:          id.to_string(),
      status:         Some(
        "Planned".to_string()
      ),
      scheduled_date: Some(
        day.to_string()
      ),
      description:    None
    }
  }

  #[test]
  fn items_land_only_on_their_own_day() {
    let store = BoardStore::new();
    store.load(vec![
      campaign("spring", "2025-03-10"),
      campaign("summer", "2025-06-01"),
    ]);
    let month = CalendarMonth::project(
      MonthCursor {
        year:   2025,
        month0: 2
      },
      date(2025, 3, 10),
      Weekday::Mon,
      &store.snapshot()
    )
    .expect("project");

    let holding: Vec<_> = month
      .cells
      .iter()
      .filter(|cell| {
        !cell.items.is_empty()
      })
      .collect();
    assert_eq!(holding.len(), 1);
    assert_eq!(
      holding[0].date(),
      Some(date(2025, 3, 10))
    );
    assert_eq!(month.rows().count(), 6);
    assert_eq!(
      month
        .cells
        .iter()
        .filter(|cell| {
          cell.date().is_some()
        })
        .count(),
      month
        .cursor
        .days_in_month()
        .expect("days") as usize
    );
    assert!(
      month
        .cell(date(2025, 3, 10))
        .and_then(|cell| {
          cell.slot.day()
        })
        .is_some_and(|day| day.is_today)
    );
  }

  #[test]
  fn days_outside_the_month_are_not_targets()
  {
    let month = CalendarMonth::project(
      MonthCursor {
        year:   2025,
        month0: 2
      },
      date(2025, 3, 1),
      Weekday::Mon,
      &BoardState::default()
    )
    .expect("project");
    assert_eq!(
      month.drop_target(
        date(2025, 4, 1),
        0
      ),
      None
    );
    assert_eq!(
      month
        .drop_target(
          date(2025, 3, 15),
          4
        )
        .map(|target| target.index),
      Some(0)
    );
  }
}
