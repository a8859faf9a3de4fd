//! Segment labels derived from R/F/M scores

use std::fmt;

/// Quartile scores of one customer, each in 1..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RfmScore {
    pub r: u8,
    pub f: u8,
    pub m: u8,
}

impl RfmScore {
    /// Three-digit code, 111..=444.
    pub fn code(&self) -> u16 {
        u16::from(self.r) * 100 + u16::from(self.f) * 10 + u16::from(self.m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Champions,
    LoyalCustomers,
    PotentialLoyalists,
    RecentCustomers,
    Promising,
    CustomersNeedingAttention,
    AtRisk,
    Other,
}

impl Segment {
    pub const ALL: [Segment; 8] = [
        Segment::Champions,
        Segment::LoyalCustomers,
        Segment::PotentialLoyalists,
        Segment::RecentCustomers,
        Segment::Promising,
        Segment::CustomersNeedingAttention,
        Segment::AtRisk,
        Segment::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::LoyalCustomers => "Loyal Customers",
            Segment::PotentialLoyalists => "Potential Loyalists",
            Segment::RecentCustomers => "Recent Customers",
            Segment::Promising => "Promising",
            Segment::CustomersNeedingAttention => "Customers Needing Attention",
            Segment::AtRisk => "At Risk",
            Segment::Other => "Other",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

type Rule = fn(&RfmScore) -> bool;

/// Labeling rules in priority order. They overlap, so order matters.
const RULES: [(Rule, Segment); 7] = [
    (|s| s.r == 4 && s.f == 4 && s.m == 4, Segment::Champions),
    (|s| s.r == 4 && s.f >= 3 && s.m >= 3, Segment::LoyalCustomers),
    (|s| s.r >= 3 && s.f >= 2 && s.m >= 2, Segment::PotentialLoyalists),
    (|s| s.r == 4 && s.f == 1, Segment::RecentCustomers),
    (|s| s.r == 3 && s.f == 1, Segment::Promising),
    (|s| s.r <= 2 && s.f >= 3, Segment::CustomersNeedingAttention),
    (|s| s.r == 1 && s.f >= 1, Segment::AtRisk),
];

/// First matching rule wins; no match is `Other`.
pub fn segment_for(score: &RfmScore) -> Segment {
    RULES
        .iter()
        .find(|(rule, _)| rule(score))
        .map(|(_, segment)| *segment)
        .unwrap_or(Segment::Other)
}
