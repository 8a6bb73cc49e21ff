//! Stripe floorplan of the logic tile.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Stripe;

/// A pair of stripes connected by wires whose length follows the floorplan.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Link {
    CbIc,
    IcLut,
    LutCc,
    LutFfble,
    CcFfble,
    FfbleSb,
    FfbleIc,
}

impl Link {
    pub const ALL: [Link; 7] = [
        Link::CbIc,
        Link::IcLut,
        Link::LutCc,
        Link::LutFfble,
        Link::CcFfble,
        Link::FfbleSb,
        Link::FfbleIc,
    ];

    /// Source and sink stripes.
    pub fn endpoints(&self) -> (Stripe, Stripe) {
        match self {
            Link::CbIc => (Stripe::Cb, Stripe::Ic),
            Link::IcLut => (Stripe::Ic, Stripe::Lut),
            Link::LutCc => (Stripe::Lut, Stripe::Cc),
            Link::LutFfble => (Stripe::Lut, Stripe::Ffble),
            Link::CcFfble => (Stripe::Cc, Stripe::Ffble),
            Link::FfbleSb => (Stripe::Ffble, Stripe::Sb),
            Link::FfbleIc => (Stripe::Ffble, Stripe::Ic),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Floorplan {
    /// Logic block height in nm.
    pub height: f64,
    /// Sum of stripe widths in nm.
    pub width: f64,
    /// Stripes left to right with their widths.
    pub stripes: Vec<(Stripe, f64)>,
    pub distances: BTreeMap<Link, f64>,
}

impl Floorplan {
    /// The floorplan used before any area is known: every distance is zero.
    pub fn flat() -> Self {
        Self {
            height: 0.0,
            width: 0.0,
            stripes: Vec::new(),
            distances: BTreeMap::new(),
        }
    }

    /// Lays out `order` for a block of the given `height`. `areas` holds
    /// the total area of each stripe kind; it is split evenly over the
    /// stripe's occurrences.
    pub fn build(order: &[Stripe], areas: &BTreeMap<Stripe, f64>, height: f64) -> Self {
        let mut counts: BTreeMap<Stripe, usize> = BTreeMap::new();
        for stripe in order {
            *counts.entry(*stripe).or_default() += 1;
        }
        let stripes: Vec<(Stripe, f64)> = order
            .iter()
            .map(|stripe| {
                let area = areas.get(stripe).copied().unwrap_or(0.0);
                let width = if height > 0.0 {
                    area / (counts[stripe] as f64 * height)
                } else {
                    0.0
                };
                (*stripe, width)
            })
            .collect();
        let width = stripes.iter().map(|(_, w)| w).sum();

        let mut distances = BTreeMap::new();
        for link in Link::ALL {
            let (src, dst) = link.endpoints();
            if let Some(d) = worst_distance(&stripes, src, dst) {
                distances.insert(link, d);
            }
        }
        Self {
            height,
            width,
            stripes,
            distances,
        }
    }

    /// Worst-case distance along `link`; zero when either end is absent.
    pub fn distance(&self, link: Link) -> f64 {
        self.distances.get(&link).copied().unwrap_or(0.0)
    }
}

/// For every occurrence of `src`, the distance to the nearest `dst`;
/// returns the largest of these.
///
/// A kind laid out as `n` stripes holds `1/n` of its area in each, so its
/// half width is divided by that fraction of the span: the wire reaches
/// across the whole kind, not just the nearest stripe.
fn worst_distance(stripes: &[(Stripe, f64)], src: Stripe, dst: Stripe) -> Option<f64> {
    let mut placed = Vec::with_capacity(stripes.len());
    let mut x = 0.0;
    for (kind, w) in stripes {
        placed.push((*kind, x + w / 2.0, w / 2.0));
        x += w;
    }
    let count = |kind: Stripe| stripes.iter().filter(|(s, _)| *s == kind).count() as f64;
    let (src_span, dst_span) = (count(src), count(dst));
    let sinks: Vec<(f64, f64)> = placed
        .iter()
        .filter(|(s, _, _)| *s == dst)
        .map(|(_, c, h)| (*c, *h))
        .collect();
    if sinks.is_empty() {
        return None;
    }
    placed
        .iter()
        .filter(|(s, _, _)| *s == src)
        .map(|(_, c, h)| {
            sinks
                .iter()
                .map(|(sc, sh)| {
                    let between = ((sc - c).abs() - h - sh).max(0.0);
                    h * src_span + between + sh * dst_span
                })
                .fold(f64::INFINITY, f64::min)
        })
        .reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_adjacent_stripes() {
        let order = [Stripe::Cb, Stripe::Ic, Stripe::Lut];
        let areas = BTreeMap::from([
            (Stripe::Cb, 200.0),
            (Stripe::Ic, 400.0),
            (Stripe::Lut, 1000.0),
        ]);
        let fp = Floorplan::build(&order, &areas, 10.0);
        assert_relative_eq!(fp.width, 160.0);
        // 20 / 2 + 40 / 2
        assert_relative_eq!(fp.distance(Link::CbIc), 30.0);
        assert_relative_eq!(fp.distance(Link::IcLut), 70.0);
        assert_eq!(fp.distance(Link::LutCc), 0.0);
    }

    #[test]
    fn test_repeated_stripes_take_worst_nearest() {
        let order = [Stripe::Ic, Stripe::Lut, Stripe::Ffble, Stripe::Lut];
        let areas = BTreeMap::from([
            (Stripe::Ic, 100.0),
            (Stripe::Lut, 200.0),
            (Stripe::Ffble, 100.0),
        ]);
        let fp = Floorplan::build(&order, &areas, 10.0);
        // Stripe widths 10, 10, 10, 10. The lut kind spans two stripes, so
        // its half width counts twice: 5 + 0 + 5 * 2.
        assert_relative_eq!(fp.distance(Link::IcLut), 15.0);
        // 5 * 2 + 0 + 5 from the second lut stripe to ffble.
        assert_relative_eq!(fp.distance(Link::LutFfble), 15.0);
        assert_relative_eq!(fp.distance(Link::FfbleIc), 20.0);
    }

    #[test]
    fn test_flat_floorplan() {
        let fp = Floorplan::flat();
        for link in Link::ALL {
            assert_eq!(fp.distance(link), 0.0);
        }
    }
}
