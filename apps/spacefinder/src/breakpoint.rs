use serde::{Deserialize, Serialize};

/// Viewport breakpoints, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Breakpoint {
    Mobile,
    MobileMedium,
    MobileLandscape,
    Phablet,
    Tablet,
    Desktop,
    LeftCol,
    Wide,
}

impl Breakpoint {
    pub const ALL: [Breakpoint; 8] = [
        Breakpoint::Mobile,
        Breakpoint::MobileMedium,
        Breakpoint::MobileLandscape,
        Breakpoint::Phablet,
        Breakpoint::Tablet,
        Breakpoint::Desktop,
        Breakpoint::LeftCol,
        Breakpoint::Wide,
    ];

    /// Minimum viewport width in CSS pixels.
    pub fn min_width(self) -> f64 {
        match self {
            Breakpoint::Mobile => 0.0,
            Breakpoint::MobileMedium => 375.0,
            Breakpoint::MobileLandscape => 480.0,
            Breakpoint::Phablet => 660.0,
            Breakpoint::Tablet => 740.0,
            Breakpoint::Desktop => 980.0,
            Breakpoint::LeftCol => 1140.0,
            Breakpoint::Wide => 1300.0,
        }
    }

    /// Widest breakpoint whose minimum width fits the viewport.
    pub fn detect(viewport_width: f64) -> Breakpoint {
        Self::ALL
            .into_iter()
            .rev()
            .find(|bp| viewport_width >= bp.min_width())
            .unwrap_or(Breakpoint::Mobile)
    }
}
