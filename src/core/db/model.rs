use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// What an image attachment hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Step,
    Note,
    ProjectDescription,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Step => "step",
            ContentKind::Note => "note",
            ContentKind::ProjectDescription => "project_description",
        }
    }
}

impl TryFrom<&str> for ContentKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "step" => Ok(ContentKind::Step),
            "note" => Ok(ContentKind::Note),
            "project_description" => Ok(ContentKind::ProjectDescription),
            _ => Err(anyhow::anyhow!("Invalid content kind: {}", value)),
        }
    }
}

/// Current UTC time, truncated to microseconds so it survives a text round trip unchanged.
pub fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_microsecond(now.microsecond()).unwrap_or(now)
}

pub(super) fn format_timestamp(value: OffsetDateTime) -> anyhow::Result<String> {
    Ok(value.format(&Rfc3339)?)
}

pub(super) fn parse_timestamp(value: &str) -> anyhow::Result<OffsetDateTime> {
    Ok(OffsetDateTime::parse(value, &Rfc3339)?)
}
