//! Exploratory SVG charts for notebooks and reports.
//!
//! Time axes are hours since the first plotted timestamp, labelled back as
//! wall-clock times. Failed estimates are simply absent from the line.

use std::path::Path;

use chrono::Duration;
use plotters::prelude::*;

use crate::batch::EstimateSeries;
use crate::data::{SmileInput, Timestamp};
use crate::error::{RndError, Result};
use crate::models::smile::FittedSmile;

const SIZE: (u32, u32) = (1280, 768);
const SMILE_STEPS: usize = 250;

fn plot_err(e: impl std::fmt::Display) -> RndError {
    RndError::Plot {
        message: e.to_string(),
    }
}

fn padded_range(values: impl Iterator<Item = f64>) -> Result<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return Err(RndError::invalid("nothing to plot"));
    }
    let pad = ((hi - lo) * 0.05).max(1e-6);
    Ok((lo - pad, hi + pad))
}

fn hours_since(origin: Timestamp, ts: Timestamp) -> f64 {
    (ts - origin).num_seconds() as f64 / 3600.0
}

struct TimeLine<'a> {
    label: &'a str,
    points: &'a [(Timestamp, f64)],
    color: RGBColor,
}

fn time_chart(
    path: &Path,
    title: &str,
    y_desc: &str,
    lines: &[TimeLine<'_>],
    marker: Option<Timestamp>,
) -> Result<()> {
    let origin = lines
        .iter()
        .flat_map(|l| l.points.iter().map(|(t, _)| *t))
        .min()
        .ok_or_else(|| RndError::invalid("nothing to plot"))?;
    let (x0, x1) = padded_range(
        lines
            .iter()
            .flat_map(|l| l.points.iter().map(|(t, _)| hours_since(origin, *t)))
            .chain(marker.map(|m| hours_since(origin, m))),
    )?;
    let (y0, y1) = padded_range(lines.iter().flat_map(|l| l.points.iter().map(|(_, v)| *v)))?;

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, ("sans-serif", 30))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(plot_err)?;

    let label_time = |h: &f64| {
        let ts = origin + Duration::seconds((*h * 3600.0).round() as i64);
        ts.format("%d.%m %H:%M").to_string()
    };
    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc(y_desc)
        .x_label_formatter(&label_time)
        .draw()
        .map_err(plot_err)?;

    for line in lines {
        let color = line.color;
        let points: Vec<(f64, f64)> = line
            .points
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(t, v)| (hours_since(origin, *t), *v))
            .collect();
        chart
            .draw_series(std::iter::once(PathElement::new(points.clone(), color)))
            .map_err(plot_err)?
            .label(line.label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        chart
            .draw_series(points.into_iter().map(|p| Circle::new(p, 2, color.filled())))
            .map_err(plot_err)?;
    }

    if let Some(m) = marker {
        let x = hours_since(origin, m);
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(x, y0), (x, y1)],
                BLACK.stroke_width(2),
            )))
            .map_err(plot_err)?
            .label("announcement")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;
    root.present().map_err(plot_err)?;
    Ok(())
}

/// Probability (or variance) series, with a vertical line at `announcement`.
pub fn plot_series(
    path: impl AsRef<Path>,
    series: &EstimateSeries,
    announcement: Option<Timestamp>,
) -> Result<()> {
    let points = series.values();
    time_chart(
        path.as_ref(),
        &series.name,
        &series.name,
        &[TimeLine {
            label: &series.name,
            points: &points,
            color: BLUE,
        }],
        announcement,
    )
}

pub fn plot_spot(
    path: impl AsRef<Path>,
    spot: &[(Timestamp, f64)],
    announcement: Option<Timestamp>,
) -> Result<()> {
    time_chart(
        path.as_ref(),
        "USDRUB spot",
        "RUB per USD",
        &[TimeLine {
            label: "spot",
            points: spot,
            color: BLUE,
        }],
        announcement,
    )
}

/// Base and counter rates on one axis, as fractions per annum.
pub fn plot_rates(
    path: impl AsRef<Path>,
    r_base: &[(Timestamp, f64)],
    r_counter: &[(Timestamp, f64)],
    announcement: Option<Timestamp>,
) -> Result<()> {
    time_chart(
        path.as_ref(),
        "Interest rates",
        "rate",
        &[
            TimeLine {
                label: "base (USD)",
                points: r_base,
                color: BLUE,
            },
            TimeLine {
                label: "counter (RUB)",
                points: r_counter,
                color: RED,
            },
        ],
        announcement,
    )
}

/// Fitted smile over the strike range of `input`, widened by 10% each side,
/// against the market points.
pub fn plot_smile(path: impl AsRef<Path>, smile: &FittedSmile, input: &SmileInput) -> Result<()> {
    let (k_lo, k_hi) = padded_range(input.strikes().into_iter())?;
    let k_lo = k_lo * 0.9;
    let k_hi = k_hi * 1.1;
    let model: Vec<(f64, f64)> = (0..=SMILE_STEPS)
        .map(|i| k_lo + (k_hi - k_lo) * i as f64 / SMILE_STEPS as f64)
        .filter_map(|k| smile.vol(k).ok().map(|v| (k, v * 100.0)))
        .collect();
    let market: Vec<(f64, f64)> = input
        .points
        .iter()
        .map(|p| (p.strike, p.vol * 100.0))
        .collect();
    let (y0, y1) = padded_range(model.iter().chain(&market).map(|(_, v)| *v))?;

    let root = SVGBackend::new(path.as_ref(), SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(
            format!(
                "{} smile vs market | {} | F={:.4}",
                smile.model_name(),
                input.timestamp.format("%Y-%m-%d %H:%M"),
                input.forward
            ),
            ("sans-serif", 30),
        )
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(k_lo..k_hi, y0..y1)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("Strike")
        .y_desc("Implied Vol (%)")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(std::iter::once(PathElement::new(model, RED)))
        .map_err(plot_err)?
        .label(smile.model_name())
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
    chart
        .draw_series(market.into_iter().map(|p| Circle::new(p, 4, BLUE.filled())))
        .map_err(plot_err)?
        .label("market")
        .legend(|(x, y)| Circle::new((x + 10, y), 4, BLUE.filled()));
    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(input.forward, y0), (input.forward, y1)],
            BLACK.mix(0.5),
        )))
        .map_err(plot_err)?;

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;
    root.present().map_err(plot_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SeriesEntry;
    use crate::data::parse_timestamp;

    #[test]
    fn series_chart_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.svg");
        let t0 = parse_timestamp("2022-02-24 10:00:00+03:00").unwrap();
        let entries = (0..5)
            .map(|i| SeriesEntry {
                timestamp: t0 + Duration::minutes(i),
                value: Ok(0.1 * i as f64),
            })
            .collect();
        let series = EstimateSeries::new("p_85", entries);
        plot_series(&path, &series, Some(t0 + Duration::minutes(2))).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn empty_series_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let series = EstimateSeries::new("p_85", Vec::new());
        assert!(plot_series(dir.path().join("p.svg"), &series, None).is_err());
    }
}
