//! Zoo sites: report-form locations and facility-map pins

use serde::Serialize;

/// A location offered by the report form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLocation {
    pub slug: &'static str,
    pub name: &'static str,
}

pub const REPORT_LOCATIONS: &[ReportLocation] = &[
    ReportLocation { slug: "main-entrance", name: "Main Entrance - Ticketing" },
    ReportLocation { slug: "small-farm", name: "Small Farm" },
    ReportLocation { slug: "giraffe-habitat", name: "Giraffe Habitat" },
    ReportLocation { slug: "food-kiosk-crepes", name: "Food Kiosk - Crepes" },
    ReportLocation { slug: "african-savanna", name: "African Savanna" },
    ReportLocation { slug: "big-aviary", name: "Big Aviary" },
    ReportLocation { slug: "bactrian-camels", name: "Bactrian Camels" },
    ReportLocation { slug: "arctic-area", name: "Arctic Area - Polar Bears" },
    ReportLocation { slug: "little-amazonia", name: "Little Amazonia" },
    ReportLocation { slug: "felines", name: "Felines - Panthers & Leopards" },
    ReportLocation { slug: "lemurs", name: "Lemurs & Primates" },
    ReportLocation { slug: "picnic-area", name: "Picnic Area" },
    ReportLocation { slug: "toilets", name: "Restrooms" },
];

/// Map a slug or display name to the canonical display name.
///
/// Unknown input is treated as free text and returned trimmed.
#[must_use]
pub fn resolve_location(input: &str) -> String {
    let trimmed = input.trim();
    REPORT_LOCATIONS
        .iter()
        .find(|loc| loc.slug.eq_ignore_ascii_case(trimmed) || loc.name.eq_ignore_ascii_case(trimmed))
        .map_or_else(|| trimmed.to_string(), |loc| loc.name.to_string())
}

/// A pin on the site plan, positioned in percent of the map's width/height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapSite {
    pub name: &'static str,
    pub x: u8,
    pub y: u8,
}

pub const MAP_SITES: &[MapSite] = &[
    MapSite { name: "Main Entrance", x: 15, y: 20 },
    MapSite { name: "Small Farm", x: 25, y: 50 },
    MapSite { name: "Giraffe Habitat", x: 70, y: 50 },
    MapSite { name: "Food Kiosk - Crepes", x: 50, y: 35 },
    MapSite { name: "African Savanna", x: 65, y: 65 },
    MapSite { name: "Big Aviary", x: 30, y: 70 },
    MapSite { name: "Bactrian Camels", x: 45, y: 25 },
    MapSite { name: "Arctic Area", x: 55, y: 15 },
    MapSite { name: "Toilets & Picnic Area", x: 80, y: 30 },
    MapSite { name: "Little Amazonia", x: 40, y: 55 },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinStatus {
    Good,
    Issue,
}

/// A map pin with its derived status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapPin {
    pub name: &'static str,
    pub x: u8,
    pub y: u8,
    pub status: PinStatus,
    pub open_incidents: usize,
}

impl MapSite {
    /// Case-insensitive containment in either direction, so "Giraffe Habitat -
    /// Viewing Platform" lands on the "Giraffe Habitat" pin.
    #[must_use]
    pub fn matches(&self, location: &str) -> bool {
        let site = self.name.to_lowercase();
        let location = location.trim().to_lowercase();
        if location.is_empty() {
            return false;
        }
        location.contains(&site) || site.contains(&location)
    }
}
