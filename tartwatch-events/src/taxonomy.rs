//! Static mapping from JIP-3 event codes to names and coarse categories.

use std::borrow::Cow;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Well-known event codes the aggregators look at directly.
pub mod codes {
    pub const DROPPED: u16 = 0;
    pub const STATUS: u16 = 10;
    pub const BEST_BLOCK_CHANGED: u16 = 11;
    pub const FINALIZED_BLOCK_CHANGED: u16 = 12;
    pub const SYNC_STATUS_CHANGED: u16 = 13;
    pub const AUTHORED: u16 = 42;
    pub const IMPORTING: u16 = 43;
    pub const BLOCK_ANNOUNCED: u16 = 62;
    pub const GUARANTEE_BUILT: u16 = 105;
}

/// Coarse grouping of event codes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    Status,
    Networking,
    Blocks,
    Tickets,
    Guaranteeing,
    Availability,
    Recovery,
    Preimages,
}

/// Lookup table scanned in order; the first range containing the code wins.
const CATEGORY_RANGES: [(EventCategory, u16, u16); 8] = [
    (EventCategory::Status, 10, 13),
    (EventCategory::Networking, 20, 28),
    (EventCategory::Blocks, 40, 68),
    (EventCategory::Tickets, 80, 84),
    (EventCategory::Guaranteeing, 90, 113),
    (EventCategory::Availability, 120, 131),
    (EventCategory::Recovery, 140, 178),
    (EventCategory::Preimages, 190, 199),
];

impl EventCategory {
    /// Every category, in lookup order.
    pub const ALL: [EventCategory; 8] = [
        EventCategory::Status,
        EventCategory::Networking,
        EventCategory::Blocks,
        EventCategory::Tickets,
        EventCategory::Guaranteeing,
        EventCategory::Availability,
        EventCategory::Recovery,
        EventCategory::Preimages,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Networking => "Networking",
            Self::Blocks => "Blocks",
            Self::Tickets => "Tickets",
            Self::Guaranteeing => "Guaranteeing",
            Self::Availability => "Availability",
            Self::Recovery => "Recovery",
            Self::Preimages => "Preimages",
        }
    }

    /// Inclusive code range covered by this category.
    pub fn range(self) -> RangeInclusive<u16> {
        CATEGORY_RANGES
            .iter()
            .find(|(category, _, _)| *category == self)
            .map(|(_, start, end)| *start..=*end)
            .unwrap_or(0..=0)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify an event code. Unmapped codes yield `None`.
pub fn classify(event_type: u16) -> Option<EventCategory> {
    CATEGORY_RANGES
        .iter()
        .find(|(_, start, end)| (*start..=*end).contains(&event_type))
        .map(|(category, _, _)| *category)
}

/// Human-readable label for an event code, `"Event <N>"` when unknown.
pub fn display_name(event_type: u16) -> Cow<'static, str> {
    match known_name(event_type) {
        Some(name) => Cow::Borrowed(name),
        None => Cow::Owned(format!("Event {event_type}")),
    }
}

fn known_name(event_type: u16) -> Option<&'static str> {
    let name = match event_type {
        0 => "Dropped",

        10 => "Status",
        11 => "Best Block Changed",
        12 => "Finalized Block Changed",
        13 => "Sync Status Changed",

        20 => "Connection Refused",
        21 => "Connecting In",
        22 => "Connect In Failed",
        23 => "Connected In",
        24 => "Connecting Out",
        25 => "Connect Out Failed",
        26 => "Connected Out",
        27 => "Disconnected",
        28 => "Peer Misbehaved",

        40 => "Authoring",
        41 => "Authoring Failed",
        42 => "Authored",
        43 => "Importing",
        44 => "Block Verification Failed",
        45 => "Block Verified",
        46 => "Block Execution Failed",
        47 => "Block Executed",

        60 => "Block Announcement Stream Opened",
        61 => "Block Announcement Stream Closed",
        62 => "Block Announced",
        63 => "Sending Block Request",
        64 => "Receiving Block Request",
        65 => "Block Request Failed",
        66 => "Block Request Sent",
        67 => "Block Request Received",
        68 => "Block Transferred",

        80 => "Generating Tickets",
        81 => "Ticket Generation Failed",
        82 => "Tickets Generated",
        83 => "Ticket Transfer Failed",
        84 => "Ticket Transferred",

        90 => "Work-Package Submission",
        91 => "Work-Package Being Shared",
        92 => "Work-Package Failed",
        93 => "Duplicate Work-Package",
        94 => "Work-Package Received",
        95 => "Authorized",
        96 => "Extrinsic Data Received",
        97 => "Imports Received",
        98 => "Sharing Work-Package",
        99 => "Work-Package Sharing Failed",
        100 => "Bundle Sent",
        101 => "Refined",
        102 => "Work-Report Built",
        103 => "Work-Report Signature Sent",
        104 => "Work-Report Signature Received",
        105 => "Guarantee Built",
        106 => "Sending Guarantee",
        107 => "Guarantee Send Failed",
        108 => "Guarantee Sent",
        109 => "Guarantees Distributed",
        110 => "Receiving Guarantee",
        111 => "Guarantee Receive Failed",
        112 => "Guarantee Received",
        113 => "Guarantee Discarded",

        120 => "Sending Shard Request",
        121 => "Receiving Shard Request",
        122 => "Shard Request Failed",
        123 => "Shard Request Sent",
        124 => "Shard Request Received",
        125 => "Shards Transferred",
        126 => "Distributing Assurance",
        127 => "Assurance Send Failed",
        128 => "Assurance Sent",
        129 => "Assurance Distributed",
        130 => "Assurance Receive Failed",
        131 => "Assurance Received",

        140 => "Sending Bundle Shard Request",
        141 => "Receiving Bundle Shard Request",
        142 => "Bundle Shard Request Failed",
        143 => "Bundle Shard Request Sent",
        144 => "Bundle Shard Request Received",
        145 => "Bundle Shard Transferred",
        146 => "Reconstructing Bundle",
        147 => "Bundle Reconstructed",
        148 => "Sending Bundle Request",
        149 => "Receiving Bundle Request",
        150 => "Bundle Request Failed",
        151 => "Bundle Request Sent",
        152 => "Bundle Request Received",
        153 => "Bundle Transferred",

        160 => "Work-Package Hash Mapped",
        161 => "Segments-Root Mapped",
        162 => "Sending Segment Shard Request",
        163 => "Receiving Segment Shard Request",
        164 => "Segment Shard Request Failed",
        165 => "Segment Shard Request Sent",
        166 => "Segment Shard Request Received",
        167 => "Segment Shards Transferred",
        168 => "Reconstructing Segments",
        169 => "Segment Reconstruction Failed",
        170 => "Segments Reconstructed",
        171 => "Segment Verification Failed",
        172 => "Segments Verified",
        173 => "Sending Segment Request",
        174 => "Receiving Segment Request",
        175 => "Segment Request Failed",
        176 => "Segment Request Sent",
        177 => "Segment Request Received",
        178 => "Segments Transferred",

        190 => "Preimage Announcement Failed",
        191 => "Preimage Announced",
        192 => "Announced Preimage Forgotten",
        193 => "Sending Preimage Request",
        194 => "Receiving Preimage Request",
        195 => "Preimage Request Failed",
        196 => "Preimage Request Sent",
        197 => "Preimage Request Received",
        198 => "Preimage Transferred",
        199 => "Preimage Discarded",

        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_inclusive_bounds() {
        assert_eq!(classify(10), Some(EventCategory::Status));
        assert_eq!(classify(13), Some(EventCategory::Status));
        assert_eq!(classify(14), None);
        assert_eq!(classify(68), Some(EventCategory::Blocks));
        assert_eq!(classify(113), Some(EventCategory::Guaranteeing));
        assert_eq!(classify(199), Some(EventCategory::Preimages));
        assert_eq!(classify(200), None);
        assert_eq!(classify(0), None);
        assert_eq!(classify(u16::MAX), None);
    }

    #[test]
    fn every_category_range_maps_back_to_itself() {
        for category in EventCategory::ALL {
            let range = category.range();
            assert_eq!(classify(*range.start()), Some(category));
            assert_eq!(classify(*range.end()), Some(category));
        }
    }

    #[test]
    fn display_name_falls_back_for_unknown_codes() {
        assert_eq!(display_name(codes::AUTHORED), "Authored");
        assert_eq!(display_name(codes::GUARANTEE_BUILT), "Guarantee Built");
        assert_eq!(display_name(0), "Dropped");
        assert_eq!(display_name(14), "Event 14");
        assert_eq!(display_name(4242), "Event 4242");
    }

    #[test]
    fn category_serializes_in_upper_case() {
        let json = serde_json::to_string(&EventCategory::Guaranteeing).expect("serialize");
        assert_eq!(json, "\"GUARANTEEING\"");
    }
}
