use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use thiserror::Error;

use crate::item::ISO_DATE;

/// Shortest grid a month is laid out on.
const MIN_ROWS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
  #[error(
    "month index {0} is out of range \
     (expected 0-11)"
  )]
  MonthOutOfRange(u32),
  #[error("year {0} is not representable")]
  YearOutOfRange(i32)
}

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct DayCell {
  pub date:     NaiveDate,
  pub iso:      String,
  pub is_today: bool
}

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub enum GridSlot {
  Placeholder,
  Day(DayCell)
}

impl GridSlot {
  pub fn day(&self) -> Option<&DayCell> {
    match self {
      | GridSlot::Day(cell) => Some(cell),
      | GridSlot::Placeholder => None
    }
  }
}

/// Lays out one month as full 7-column
/// rows, never fewer than five.
/// `month0` is 0-indexed.
pub fn month_grid(
  year: i32,
  month0: u32,
  today: NaiveDate,
  week_start: Weekday
) -> Result<Vec<GridSlot>, GridError> {
  if month0 > 11 {
    return Err(
      GridError::MonthOutOfRange(month0)
    );
  }
  let month = month0 + 1;
  let first =
    NaiveDate::from_ymd_opt(
      year, month, 1
    )
    .ok_or(GridError::YearOutOfRange(
      year
    ))?;
  let day_count =
    days_in_month(year, month)?;

  let leading =
    weekday_offset(first, week_start);
  let used =
    leading + day_count as usize;
  let total =
    used.div_ceil(7).max(MIN_ROWS) * 7;

  let mut slots =
    Vec::with_capacity(total);
  slots.extend(
    std::iter::repeat_n(
      GridSlot::Placeholder,
      leading
    )
  );
  for offset in 0..day_count {
    let date = add_days(
      first,
      i64::from(offset)
    );
    slots.push(GridSlot::Day(DayCell {
      date,
      iso: date
        .format(ISO_DATE)
        .to_string(),
      is_today: date == today
    }));
  }
  slots.resize(
    total,
    GridSlot::Placeholder
  );
  Ok(slots)
}

pub fn weekday_offset(
  day: NaiveDate,
  week_start: Weekday
) -> usize {
  let day_idx = day
    .weekday()
    .num_days_from_sunday()
    as usize;
  let start_idx = week_start
    .num_days_from_sunday()
    as usize;
  (7 + day_idx - start_idx) % 7
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> Result<u32, GridError> {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  let next_first =
    NaiveDate::from_ymd_opt(
      next_year, next_month, 1
    )
    .ok_or(GridError::YearOutOfRange(
      year
    ))?;
  Ok(add_days(next_first, -1).day())
}

fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

pub fn weekday_labels(
  week_start: Weekday
) -> Vec<&'static str> {
  let mut day = week_start;
  let mut labels =
    Vec::with_capacity(7);
  for _ in 0..7 {
    labels.push(match day {
      | Weekday::Mon => "Mon",
      | Weekday::Tue => "Tue",
      | Weekday::Wed => "Wed",
      | Weekday::Thu => "Thu",
      | Weekday::Fri => "Fri",
      | Weekday::Sat => "Sat",
      | Weekday::Sun => "Sun"
    });
    day = day.succ();
  }
  labels
}

pub fn parse_week_start(
  raw: &str
) -> Weekday {
  if raw
    .trim()
    .eq_ignore_ascii_case("sunday")
  {
    Weekday::Sun
  } else {
    Weekday::Mon
  }
}

pub fn parse_timezone(
  raw: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => Some(tz),
    | Err(error) => {
      tracing::error!(
        timezone = %trimmed,
        error = %error,
        "invalid timezone id"
      );
      None
    }
  }
}

pub fn today_in(
  timezone: Option<Tz>
) -> NaiveDate {
  match timezone {
    | Some(tz) => Utc::now()
      .with_timezone(&tz)
      .date_naive(),
    | None => {
      chrono::Local::now().date_naive()
    }
  }
}

/// The month a calendar view is
/// showing.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
)]
pub struct MonthCursor {
  pub year:   i32,
  pub month0: u32
}

impl MonthCursor {
  pub fn containing(
    date: NaiveDate
  ) -> Self {
    Self {
      year:   date.year(),
      month0: date.month0()
    }
  }

  pub fn next(self) -> Self {
    if self.month0 >= 11 {
      Self {
        year:   self
          .year
          .saturating_add(1),
        month0: 0
      }
    } else {
      Self {
        year:   self.year,
        month0: self.month0 + 1
      }
    }
  }

  pub fn prev(self) -> Self {
    if self.month0 == 0 {
      Self {
        year:   self
          .year
          .saturating_sub(1),
        month0: 11
      }
    } else {
      Self {
        year:   self.year,
        month0: self.month0 - 1
      }
    }
  }

  pub fn days_in_month(
    self
  ) -> Result<u32, GridError> {
    days_in_month(
      self.year,
      self.month0 + 1
    )
  }

  pub fn contains(
    self,
    date: NaiveDate
  ) -> bool {
    date.year() == self.year
      && date.month0() == self.month0
  }

  pub fn title(self) -> String {
    NaiveDate::from_ymd_opt(
      self.year,
      self.month0 + 1,
      1
    )
    .map(|first| {
      first.format("%B %Y").to_string()
    })
    .unwrap_or_else(|| {
      format!(
        "{}-{:02}",
        self.year,
        self.month0 + 1
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn day_cells(
    slots: &[GridSlot]
  ) -> Vec<&DayCell> {
    slots
      .iter()
      .filter_map(GridSlot::day)
      .collect()
  }

  #[test]
  fn march_2025_has_five_leading_blanks_and_six_rows()
   {
    let slots = month_grid(
      2025,
      2,
      date(2026, 1, 1),
      Weekday::Mon
    )
    .expect("grid");

    assert_eq!(slots.len(), 42);
    assert!(
      slots[..5].iter().all(|slot| {
        *slot == GridSlot::Placeholder
      })
    );
    assert!(slots[5].day().is_some());
    let days = day_cells(&slots);
    assert_eq!(days.len(), 31);
    assert_eq!(days[0].iso, "2025-03-01");
    assert_eq!(days[30].iso, "2025-03-31");
    assert!(
      slots[36..].iter().all(|slot| {
        *slot == GridSlot::Placeholder
      })
    );
  }

  #[test]
  fn february_starting_on_week_start_still_gets_five_rows()
   {
    // 2010-02-01 was a Monday, 2015-02-01 a Sunday.
    for (year, week_start) in [
      (2010, Weekday::Mon),
      (2015, Weekday::Sun)
    ] {
      let slots = month_grid(
        year,
        1,
        date(year, 2, 14),
        week_start
      )
      .expect("grid");
      assert_eq!(slots.len(), 35);
      assert!(slots[0].day().is_some());
      assert_eq!(day_cells(&slots).len(), 28);
      assert!(
        slots[28..].iter().all(|slot| {
          *slot == GridSlot::Placeholder
        })
      );
    }
  }

  #[test]
  fn every_month_is_whole_weeks_with_one_today_at_most()
   {
    let today = date(2024, 2, 29);
    for year in [1999, 2000, 2023, 2024]
    {
      for month0 in 0..12 {
        for week_start in
          [Weekday::Sun, Weekday::Mon]
        {
          let slots = month_grid(
            year, month0, today,
            week_start
          )
          .expect("grid");
          assert_eq!(slots.len() % 7, 0);
          assert!(
            (35..=42).contains(&slots.len())
          );

          let days = day_cells(&slots);
          let expected = days_in_month(
            year,
            month0 + 1
          )
          .expect("days");
          assert_eq!(
            days.len() as u32,
            expected
          );

          let todays = days
            .iter()
            .filter(|cell| cell.is_today)
            .count();
          let wanted = usize::from(
            year == 2024 && month0 == 1
          );
          assert_eq!(todays, wanted);
        }
      }
    }
  }

  #[test]
  fn grid_is_deterministic() {
    let today = date(2025, 3, 10);
    let first = month_grid(
      2025,
      2,
      today,
      Weekday::Sun
    );
    let second = month_grid(
      2025,
      2,
      today,
      Weekday::Sun
    );
    assert_eq!(first, second);
  }

  #[test]
  fn sunday_start_adds_a_leading_blank() {
    let slots = month_grid(
      2025,
      2,
      date(2025, 3, 10),
      Weekday::Sun
    )
    .expect("grid");
    assert_eq!(
      slots
        .iter()
        .take_while(|slot| {
          slot.day().is_none()
        })
        .count(),
      6
    );
    assert_eq!(slots.len(), 42);
  }

  #[test]
  fn week_start_is_monday_unless_sunday_is_asked_for()
   {
    assert_eq!(
      parse_week_start("Sunday"),
      Weekday::Sun
    );
    assert_eq!(
      parse_week_start(""),
      Weekday::Mon
    );
  }

  #[test]
  fn rejects_month_twelve() {
    assert_eq!(
      month_grid(
        2025,
        12,
        date(2025, 1, 1),
        Weekday::Sun
      ),
      Err(GridError::MonthOutOfRange(12))
    );
  }

  #[test]
  fn cursor_wraps_years() {
    let dec = MonthCursor {
      year:   2024,
      month0: 11
    };
    assert_eq!(
      dec.next(),
      MonthCursor {
        year:   2025,
        month0: 0
      }
    );
    assert_eq!(dec.next().prev(), dec);
    assert_eq!(
      dec.title(),
      "December 2024"
    );
  }

  #[test]
  fn labels_follow_week_start() {
    assert_eq!(
      weekday_labels(Weekday::Sun)[0],
      "Sun"
    );
    assert_eq!(
      weekday_labels(Weekday::Mon)[6],
      "Sun"
    );
  }
}
