use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
  Task,
  Campaign,
  Channel
}

impl Variant {
  pub const ALL: [Variant; 3] = [
    Variant::Task,
    Variant::Campaign,
    Variant::Channel
  ];

  pub fn as_key(
    self
  ) -> &'static str {
    match self {
      | Variant::Task => "task",
      | Variant::Campaign => "campaign",
      | Variant::Channel => "channel"
    }
  }

  pub fn from_key(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "task" | "tasks" => {
        Some(Variant::Task)
      }
      | "campaign" | "campaigns" => {
        Some(Variant::Campaign)
      }
      | "channel" | "channels" => {
        Some(Variant::Channel)
      }
      | _ => None
    }
  }
}

impl std::fmt::Display for Variant {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.write_str(self.as_key())
  }
}

/// One row of the inbound data feed.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
  pub id:             String,
  pub variant:        Variant,
  #[serde(default)]
  pub title:          String,
  #[serde(default)]
  pub status:         Option<String>,
  #[serde(default)]
  pub scheduled_date: Option<String>,
  #[serde(default)]
  pub description:    Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub enum MoveTargetDto {
  Status(String),
  ScheduledDate(String)
}

/// Outbound payload for one committed move.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct PersistMoveArgs {
  pub id:      String,
  pub variant: Variant,
  pub target:  MoveTargetDto
}
