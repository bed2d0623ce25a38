use chrono::NaiveDate;
use serde::Serialize;

use crate::model::PriceBar;

/// Bars on each side a pivot must dominate.
const PIVOT_ORDER: usize = 5;
const MIN_BARS: usize = 50;
const MIN_STRENGTH: usize = 2;
/// Half-width of a zone as a fraction of its centre.
const ZONE_HALF_WIDTH: f64 = 0.005;
/// Zones further than this fraction from the last close are dropped.
const PRICE_BAND: f64 = 0.20;
const MAX_ZONES: usize = 10;
const MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneKind {
    /// Supply, clustered from swing highs.
    Resistance,
    /// Demand, clustered from swing lows.
    Support,
}

/// A horizontal price band touched by at least two pivots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    #[serde(rename = "type")]
    pub kind: ZoneKind,
    pub top: f64,
    pub bottom: f64,
    /// Number of pivots in the cluster.
    pub strength: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Zone {
    fn overlaps(&self, other: &Zone) -> bool {
        !(self.top < other.bottom || self.bottom > other.top)
    }
}

/// Detect supply and demand zones from swing pivots.
///
/// Bars must be cleaned and in ascending order. Fewer than 50 bars yields no
/// zones.
pub fn detect(bars: &[PriceBar]) -> Vec<Zone> {
    if bars.len() < MIN_BARS {
        return Vec::new();
    }
    let Some(current) = bars.last().map(|b| b.close) else {
        return Vec::new();
    };

    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

    let resistance = pivots(&highs, |candidate, neighbour| candidate > neighbour);
    let support = pivots(&lows, |candidate, neighbour| candidate < neighbour);

    let mut zones = cluster_zones(bars, &resistance, &highs, ZoneKind::Resistance);
    zones.extend(cluster_zones(bars, &support, &lows, ZoneKind::Support));

    let (upper, lower) = (current * (1.0 + PRICE_BAND), current * (1.0 - PRICE_BAND));
    zones.retain(|z| z.bottom <= upper && z.top >= lower);

    // stable: equal strengths keep resistance-before-support order
    zones.sort_by(|a, b| b.strength.cmp(&a.strength));
    zones.truncate(MAX_ZONES);

    remove_overlaps(zones)
}

/// Indices that strictly dominate `PIVOT_ORDER` values on both sides.
fn pivots(values: &[f64], dominates: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    if values.len() <= 2 * PIVOT_ORDER {
        return Vec::new();
    }
    (PIVOT_ORDER..values.len() - PIVOT_ORDER)
        .filter(|&i| {
            (i - PIVOT_ORDER..=i + PIVOT_ORDER)
                .filter(|&j| j != i)
                .all(|j| dominates(values[i], values[j]))
        })
        .collect()
}

fn cluster_zones(
    bars: &[PriceBar],
    indices: &[usize],
    values: &[f64],
    kind: ZoneKind,
) -> Vec<Zone> {
    if indices.len() < 2 {
        return Vec::new();
    }

    let prices: Vec<f64> = indices.iter().map(|&i| values[i]).collect();
    // k == n for two pivots: singleton clusters, which MIN_STRENGTH rejects
    let k = (prices.len() / 3).max(2);
    let (centers, labels) = kmeans_1d(&prices, k);

    centers
        .iter()
        .enumerate()
        .filter_map(|(cluster, &center)| {
            let members: Vec<usize> = labels
                .iter()
                .zip(indices)
                .filter(|(label, _)| **label == cluster)
                .map(|(_, &index)| index)
                .collect();
            if members.len() < MIN_STRENGTH {
                return None;
            }
            let dates = members.iter().map(|&i| bars[i].timestamp.date_naive());
            let start_date = dates.clone().min()?;
            let end_date = dates.max()?;
            let half_width = center * ZONE_HALF_WIDTH;
            Some(Zone {
                kind,
                top: center + half_width,
                bottom: center - half_width,
                strength: members.len(),
                start_date,
                end_date,
            })
        })
        .collect()
}

/// Deterministic 1-D k-means with quantile seeding.
///
/// Returns cluster centres and, per value, the index of its cluster. Ties go
/// to the lower cluster index; an emptied cluster keeps its previous centre.
fn kmeans_1d(values: &[f64], k: usize) -> (Vec<f64>, Vec<usize>) {
    let n = values.len();
    if n == 0 || k == 0 {
        return (Vec::new(), vec![0; n]);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut centers: Vec<f64> = (0..k).map(|j| sorted[((2 * j + 1) * n) / (2 * k)]).collect();
    let mut labels = vec![usize::MAX; n];

    for _ in 0..MAX_ITERATIONS {
        let assigned: Vec<usize> = values.iter().map(|&v| nearest(&centers, v)).collect();
        if assigned == labels {
            break;
        }
        labels = assigned;

        for (cluster, center) in centers.iter_mut().enumerate() {
            let (sum, count) = values
                .iter()
                .zip(&labels)
                .filter(|(_, label)| **label == cluster)
                .fold((0.0, 0usize), |(sum, count), (v, _)| (sum + v, count + 1));
            if count > 0 {
                *center = sum / count as f64;
            }
        }
    }

    (centers, labels)
}

fn nearest(centers: &[f64], value: f64) -> usize {
    let mut best = 0;
    for (i, center) in centers.iter().enumerate().skip(1) {
        if (value - center).abs() < (value - centers[best]).abs() {
            best = i;
        }
    }
    best
}

/// Keep each zone only if it does not overlap a stronger zone already kept.
///
/// Input must be sorted by descending strength.
fn remove_overlaps(zones: Vec<Zone>) -> Vec<Zone> {
    let mut kept: Vec<Zone> = Vec::with_capacity(zones.len());
    for zone in zones {
        if !kept.iter().any(|existing| existing.overlaps(&zone)) {
            kept.push(zone);
        }
    }
    kept
}
