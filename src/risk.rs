//! Scam-risk scoring for listings.
//!
//! Each listing gets a 0-100 score built from independent signals: price
//! against typical market value, wording in the title and description, photo
//! count, location and seller name. Every signal that fires adds a reason.
//! Scoring is pure and works on whatever fields the listing carries.

use crate::models::Listing;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// How worried to be about a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn from_score(score: i32) -> Self {
        if score >= 70 {
            RiskLevel::High
        } else if score >= 40 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Outcome of [`assess`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0 (nothing suspicious) to 100
    pub score: u8,
    pub level: RiskLevel,
    /// One line per signal that fired, in evaluation order
    pub reasons: Vec<String>,
}

/// Items that are often faked, with the lowest believable price.
const EXPENSIVE_ITEMS: &[(&str, f64, i32)] = &[
    ("iphone", 300.0, 30),
    ("macbook", 600.0, 30),
    ("playstation 5", 350.0, 30),
    ("ps5", 350.0, 30),
    ("samsung s23", 400.0, 25),
    ("rolex", 2000.0, 40),
    ("louis vuitton", 500.0, 35),
];

/// Title words, their score and the reason shown. Negative scores reassure.
const TITLE_SIGNALS: &[(&[&str], i32, Option<&str>)] = &[
    (&["nuovo", "sigillato", "scontato"], 10, Some("Promesse troppo allettanti")),
    (&["urgente", "affare"], 8, Some("Senso di urgenza sospetto")),
    (&["originale", "100% originale"], 5, Some("Enfasi eccessiva su originalità")),
    (&["garanzia", "scontrino"], -5, None),
];

static DESCRIPTION_FLAGS: LazyLock<Vec<(Regex, i32, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)pagament[oi] antic", 35, "Richiesta pagamento anticipato"),
        (r"(?i)western union|moneygram|ricarica", 40, "Metodo di pagamento non tracciabile"),
        (r"(?i)spedizion[ei] grat", 10, "Spedizione gratuita per oggetto costoso"),
        (r"(?i)whatsapp|telegram", 15, "Richiesta di contatto esterno alla piattaforma"),
        (r"(?i)no perditempo|solo interessat", 8, "Tono aggressivo"),
    ]
    .into_iter()
    .map(|(pattern, score, reason)| (Regex::new(pattern).unwrap(), score, reason))
    .collect()
});

static SUSPICIOUS_SELLERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)^user\d+$", r"(?i)^account\d+$", r"(?i)^[a-z]{20,}$"]
        .into_iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
});

const STOCK_PHOTO_MARKERS: &[&str] = &["placeholder", "stock", "default"];
const VAGUE_LOCATIONS: &[&str] = &["italia", "tutta italia", "everywhere"];

/// One signal's contribution.
type Signal = (i32, Option<String>);

/// Scores a listing.
pub fn assess(listing: &Listing) -> RiskAssessment {
    let mut signals: Vec<Signal> = Vec::new();

    if let Some(price) = listing.price.filter(|p| *p != 0.0 && !p.is_nan()) {
        signals.push(price_signal(&listing.title, price));
    }
    signals.push(title_signal(&listing.title));
    if let Some(description) = present(&listing.description) {
        signals.push(description_signal(description));
    }
    signals.push(photo_signal(&listing.photos));
    if let Some(location) = present(&listing.location) {
        signals.push(location_signal(location));
    }
    if let Some(seller) = present(&listing.seller_name) {
        signals.push(seller_signal(seller));
    }

    let total: i32 = signals.iter().map(|(score, _)| score).sum();
    RiskAssessment {
        score: total.clamp(0, 100) as u8,
        level: RiskLevel::from_score(total),
        reasons: signals.into_iter().filter_map(|(_, reason)| reason).collect(),
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn price_signal(title: &str, price: f64) -> Signal {
    let title = title.to_lowercase();

    for (item, normal_min, weight) in EXPENSIVE_ITEMS {
        if !title.contains(item) {
            continue;
        }
        if price < normal_min * 0.3 {
            return (*weight, Some(format!("Prezzo sospettosamente basso per {} (€{})", item, price)));
        }
        if price < normal_min * 0.5 {
            return (
                weight * 3 / 5,
                Some(format!("Prezzo molto conveniente per {}, verifica autenticità", item)),
            );
        }
    }

    if price == 1.0 {
        return (25, Some("Prezzo simbolico (€1), contatta venditore per prezzo reale".to_string()));
    }
    if price >= 500.0 && price % 100.0 == 0.0 {
        return (5, Some("Prezzo molto tondo per prodotto costoso".to_string()));
    }
    (0, None)
}

/// The strongest title word wins; ties keep the first match.
fn title_signal(title: &str) -> Signal {
    let title = title.to_lowercase();
    let mut best: (i32, Option<&str>) = (0, None);

    for (words, score, reason) in TITLE_SIGNALS {
        if words.iter().any(|w| title.contains(w)) && score.abs() > best.0.abs() {
            best = (*score, *reason);
        }
    }
    (best.0, best.1.map(String::from))
}

fn description_signal(description: &str) -> Signal {
    if description.chars().count() < 20 {
        return (15, Some("Descrizione molto breve o assente".to_string()));
    }
    DESCRIPTION_FLAGS
        .iter()
        .find(|(pattern, _, _)| pattern.is_match(description))
        .map(|(_, score, reason)| (*score, Some(reason.to_string())))
        .unwrap_or((0, None))
}

fn photo_signal(photos: &[String]) -> Signal {
    match photos.len() {
        0 => return (20, Some("Nessuna foto disponibile".to_string())),
        1 => return (10, Some("Solo una foto disponibile".to_string())),
        _ => {}
    }

    let stock = photos.iter().any(|photo| {
        let photo = photo.to_lowercase();
        STOCK_PHOTO_MARKERS.iter().any(|marker| photo.contains(marker))
    });
    if stock {
        (15, Some("Foto potrebbero essere stock/scaricate".to_string()))
    } else {
        (0, None)
    }
}

fn location_signal(location: &str) -> Signal {
    if location.chars().count() < 3 {
        return (10, Some("Località non specificata".to_string()));
    }
    let location = location.to_lowercase();
    if VAGUE_LOCATIONS.iter().any(|vague| location.contains(vague)) {
        return (12, Some("Località troppo generica".to_string()));
    }
    (0, None)
}

fn seller_signal(seller: &str) -> Signal {
    if seller.chars().count() < 3 {
        return (8, Some("Nome venditore non specificato".to_string()));
    }
    if SUSPICIOUS_SELLERS.iter().any(|pattern| pattern.is_match(seller)) {
        return (12, Some("Nome venditore sospetto".to_string()));
    }
    (0, None)
}
