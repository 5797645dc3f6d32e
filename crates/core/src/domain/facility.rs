use serde::{Deserialize, Serialize};

/// Physical business locations. Leads and seller pools are partitioned by
/// facility; rotation never crosses facility boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facility {
    Falkenberg,
    Goteborg,
    Trollhattan,
}

impl Facility {
    pub const ALL: [Facility; 3] =
        [Facility::Falkenberg, Facility::Goteborg, Facility::Trollhattan];

    /// Display name, as persisted and shown to users.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Falkenberg => "Falkenberg",
            Self::Goteborg => "Göteborg",
            Self::Trollhattan => "Trollhättan",
        }
    }

    /// Accepts display names and their ASCII fallbacks, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "falkenberg" => Some(Self::Falkenberg),
            "göteborg" | "goteborg" => Some(Self::Goteborg),
            "trollhättan" | "trollhattan" => Some(Self::Trollhattan),
            _ => None,
        }
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
