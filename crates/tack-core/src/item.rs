use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tack_shared::{ItemRecord, MoveTargetDto, PersistMoveArgs, Variant};
use thiserror::Error;

pub const ISO_DATE: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub variant: Variant,
    pub id: String,
}

impl ItemKey {
    pub fn new(variant: Variant, id: impl Into<String>) -> Self {
        Self {
            variant,
            id: id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.variant, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Todo => "To-do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CampaignStatus {
    Planned,
    InProgress,
    Launched,
    Delayed,
}

impl CampaignStatus {
    pub const ALL: [CampaignStatus; 4] = [
        CampaignStatus::Planned,
        CampaignStatus::InProgress,
        CampaignStatus::Launched,
        CampaignStatus::Delayed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CampaignStatus::Planned => "Planned",
            CampaignStatus::InProgress => "In Progress",
            CampaignStatus::Launched => "Launched",
            CampaignStatus::Delayed => "Delayed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelStatus {
    Active,
    Paused,
    Delayed,
}

impl ChannelStatus {
    pub const ALL: [ChannelStatus; 3] = [
        ChannelStatus::Active,
        ChannelStatus::Paused,
        ChannelStatus::Delayed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ChannelStatus::Active => "Active",
            ChannelStatus::Paused => "Paused",
            ChannelStatus::Delayed => "Delayed",
        }
    }
}

/// A status value that carries its variant, so a status can never be
/// paired with the wrong kind of item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Task(TaskStatus),
    Campaign(CampaignStatus),
    Channel(ChannelStatus),
}

impl Status {
    pub fn variant(self) -> Variant {
        match self {
            Status::Task(_) => Variant::Task,
            Status::Campaign(_) => Variant::Campaign,
            Status::Channel(_) => Variant::Channel,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Task(status) => status.label(),
            Status::Campaign(status) => status.label(),
            Status::Channel(status) => status.label(),
        }
    }

    /// Column order for a variant's board.
    pub fn all(variant: Variant) -> Vec<Status> {
        match variant {
            Variant::Task => TaskStatus::ALL.into_iter().map(Status::Task).collect(),
            Variant::Campaign => CampaignStatus::ALL
                .into_iter()
                .map(Status::Campaign)
                .collect(),
            Variant::Channel => ChannelStatus::ALL
                .into_iter()
                .map(Status::Channel)
                .collect(),
        }
    }

    pub fn initial(variant: Variant) -> Status {
        match variant {
            Variant::Task => Status::Task(TaskStatus::Todo),
            Variant::Campaign => Status::Campaign(CampaignStatus::Planned),
            Variant::Channel => Status::Channel(ChannelStatus::Active),
        }
    }

    pub fn parse(variant: Variant, raw: &str) -> Option<Status> {
        let wanted = normalize_label(raw);
        Status::all(variant)
            .into_iter()
            .find(|status| normalize_label(status.label()) == wanted)
    }

    /// The following column, wrapping back to the first.
    pub fn next(self) -> Status {
        let all = Status::all(self.variant());
        let idx = all.iter().position(|s| *s == self).unwrap_or(0);
        all[(idx + 1) % all.len()]
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn normalize_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A place an item can sit: a status column on its variant's board, or a
/// day cell on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerId {
    Column(Status),
    Day(NaiveDate),
}

pub fn status_to_column(status: Status) -> ContainerId {
    ContainerId::Column(status)
}

impl ContainerId {
    /// Parses a drop target key. Dates win over labels; anything that is
    /// neither a date nor one of the variant's status labels is `None`.
    pub fn parse(variant: Variant, raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if let Some(date) = parse_iso_date(trimmed) {
            return Some(ContainerId::Day(date));
        }
        Status::parse(variant, trimmed).map(status_to_column)
    }

    pub fn key(&self) -> String {
        match self {
            ContainerId::Column(status) => status.label().to_string(),
            ContainerId::Day(date) => date.format(ISO_DATE).to_string(),
        }
    }

    pub fn is_day(&self) -> bool {
        matches!(self, ContainerId::Day(_))
    }

    pub fn accepts(&self, variant: Variant) -> bool {
        match self {
            ContainerId::Column(status) => status.variant() == variant,
            ContainerId::Day(_) => variant != Variant::Channel,
        }
    }

    pub fn same_surface(&self, other: &ContainerId) -> bool {
        match (self, other) {
            (ContainerId::Column(a), ContainerId::Column(b)) => a.variant() == b.variant(),
            (ContainerId::Day(_), ContainerId::Day(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("{variant} record has an empty id")]
    EmptyId { variant: Variant },
    #[error("{variant} {id}: unknown status {label:?}")]
    UnknownStatus {
        variant: Variant,
        id: String,
        label: String,
    },
    #[error("{variant} {id}: missing status")]
    MissingStatus { variant: Variant, id: String },
    #[error("{variant} {id}: invalid scheduled date {raw:?}")]
    InvalidDate {
        variant: Variant,
        id: String,
        raw: String,
    },
    #[error("channel {id} cannot carry a scheduled date")]
    DatedChannel { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: ItemKey,
    pub title: String,
    pub description: Option<String>,
    pub status: Status,
    pub scheduled: Option<NaiveDate>,
}

impl Item {
    pub fn from_record(record: ItemRecord) -> Result<Self, ItemError> {
        let ItemRecord {
            id,
            variant,
            title,
            status,
            scheduled_date,
            description,
        } = record;

        if id.trim().is_empty() {
            return Err(ItemError::EmptyId { variant });
        }

        let status = match status.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => {
                Status::parse(variant, label).ok_or_else(|| ItemError::UnknownStatus {
                    variant,
                    id: id.clone(),
                    label: label.to_string(),
                })?
            }
            _ if variant == Variant::Channel => {
                return Err(ItemError::MissingStatus { variant, id });
            }
            _ => Status::initial(variant),
        };

        let scheduled = match scheduled_date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                if variant == Variant::Channel {
                    return Err(ItemError::DatedChannel { id });
                }
                Some(parse_iso_date(raw).ok_or_else(|| ItemError::InvalidDate {
                    variant,
                    id: id.clone(),
                    raw: raw.to_string(),
                })?)
            }
            _ => None,
        };

        Ok(Self {
            key: ItemKey::new(variant, id),
            title,
            description: description.filter(|text| !text.trim().is_empty()),
            status,
            scheduled,
        })
    }

    pub fn to_record(&self) -> ItemRecord {
        ItemRecord {
            id: self.key.id.clone(),
            variant: self.key.variant,
            title: self.title.clone(),
            status: Some(self.status.label().to_string()),
            scheduled_date: self.scheduled.map(|date| date.format(ISO_DATE).to_string()),
            description: self.description.clone(),
        }
    }

    pub fn is_calendar_eligible(&self) -> bool {
        self.scheduled.is_some()
    }

    pub fn column(&self) -> ContainerId {
        status_to_column(self.status)
    }

    pub fn day(&self) -> Option<ContainerId> {
        self.scheduled.map(ContainerId::Day)
    }

    /// Where the item currently sits on the surface `container` belongs to.
    pub fn placement_like(&self, container: &ContainerId) -> Option<ContainerId> {
        if container.is_day() {
            self.day()
        } else {
            Some(self.column())
        }
    }

    /// Rewrites the field that `container` maps to. Returns false when the
    /// container does not accept this item.
    pub fn place_in(&mut self, container: &ContainerId) -> bool {
        if !container.accepts(self.key.variant) {
            return false;
        }
        match container {
            ContainerId::Column(status) => self.status = *status,
            ContainerId::Day(date) => self.scheduled = Some(*date),
        }
        true
    }
}

pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    // chrono accepts unpadded fields; the wire format does not.
    if trimmed.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, ISO_DATE).ok()
}

pub fn persist_args(key: &ItemKey, container: &ContainerId) -> PersistMoveArgs {
    let target = match container {
        ContainerId::Column(status) => MoveTargetDto::Status(status.label().to_string()),
        ContainerId::Day(date) => MoveTargetDto::ScheduledDate(date.format(ISO_DATE).to_string()),
    };
    PersistMoveArgs {
        id: key.id.clone(),
        variant: key.variant,
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(variant: Variant, status: Option<&str>, date: Option<&str>) -> ItemRecord {
        ItemRecord {
            id: "x-1".to_string(),
            variant,
            title: "Sample".to_string(),
            status: status.map(str::to_string),
            scheduled_date: date.map(str::to_string),
            description: None,
        }
    }

    #[test]
    fn every_status_maps_to_its_own_column_and_back() {
        for variant in Variant::ALL {
            for status in Status::all(variant) {
                let column = status_to_column(status);
                assert!(column.accepts(variant));
                assert_eq!(ContainerId::parse(variant, &column.key()), Some(column));
                assert_eq!(status.variant(), variant);
            }
        }
    }

    #[test]
    fn labels_parse_loosely_but_only_within_variant() {
        assert_eq!(
            Status::parse(Variant::Task, "to do"),
            Some(Status::Task(TaskStatus::Todo))
        );
        assert_eq!(
            Status::parse(Variant::Task, "IN PROGRESS"),
            Some(Status::Task(TaskStatus::InProgress))
        );
        assert_eq!(Status::parse(Variant::Task, "Launched"), None);
        assert_eq!(
            Status::parse(Variant::Channel, "Delayed"),
            Some(Status::Channel(ChannelStatus::Delayed))
        );
    }

    #[test]
    fn next_wraps_around_the_board() {
        assert_eq!(
            Status::Task(TaskStatus::Done).next(),
            Status::Task(TaskStatus::Todo)
        );
        assert_eq!(
            Status::Campaign(CampaignStatus::Planned).next(),
            Status::Campaign(CampaignStatus::InProgress)
        );
    }

    #[test]
    fn record_validation_rejects_bad_rows() {
        assert!(matches!(
            Item::from_record(record(Variant::Task, Some("Archived"), None)),
            Err(ItemError::UnknownStatus { .. })
        ));
        assert!(matches!(
            Item::from_record(record(Variant::Channel, Some("Active"), Some("2025-03-01"))),
            Err(ItemError::DatedChannel { .. })
        ));
        assert!(matches!(
            Item::from_record(record(Variant::Campaign, Some("Planned"), Some("2025-3-1"))),
            Err(ItemError::InvalidDate { .. })
        ));
        assert!(matches!(
            Item::from_record(record(Variant::Channel, None, None)),
            Err(ItemError::MissingStatus { .. })
        ));
    }

    #[test]
    fn missing_task_status_starts_in_first_column() {
        let item = Item::from_record(record(Variant::Task, None, Some("2025-03-10")))
            .expect("valid record");
        assert_eq!(item.status, Status::Task(TaskStatus::Todo));
        assert!(item.is_calendar_eligible());
        assert_eq!(item.to_record().status.as_deref(), Some("To-do"));
    }

    #[test]
    fn channels_never_accept_day_cells() {
        let mut item = Item::from_record(record(Variant::Channel, Some("Paused"), None))
            .expect("valid record");
        let day = ContainerId::Day(NaiveDate::from_ymd_opt(2025, 3, 15).expect("valid date"));
        assert!(!item.place_in(&day));
        assert_eq!(item.scheduled, None);
        assert!(!item.place_in(&status_to_column(Status::Task(TaskStatus::Done))));
    }

    #[test]
    fn garbage_target_keys_are_not_containers() {
        assert_eq!(ContainerId::parse(Variant::Task, "somewhere"), None);
        assert_eq!(ContainerId::parse(Variant::Task, ""), None);
    }
}
