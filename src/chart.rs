use plotters::prelude::*;
use plotters::coord::ranged1d::SegmentValue;

use crate::bionomia::ContributorCount;
use crate::error::{AppError, Result};

pub const CHART_TITLE: &str = "ORCIDs missing from Collections Management System";
pub const CHART_SUBTITLE: &str = "Top 5 people identifiers by number of new attributions in Bionomia";
pub const CHART_CONTENT_TYPE: &str = "image/svg+xml";
pub const CHART_EXTENSION: &str = "svg";

const WIDTH: u32 = 800;
const HEIGHT: u32 = 500;

/// A rendered chart held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    pub svg: String,
}

impl Chart {
    pub fn as_bytes(&self) -> &[u8] {
        self.svg.as_bytes()
    }
}

/// Bar chart of attribution counts per contributor, one colour per bar, no legend.
pub fn render_attribution_chart(contributors: &[ContributorCount]) -> Result<Chart> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;

        let (header, body) = root.split_vertically(70);
        header
            .draw(&Text::new(CHART_TITLE, (20, 12), ("sans-serif", 22).into_font()))
            .map_err(chart_error)?;
        header
            .draw(&Text::new(
                CHART_SUBTITLE,
                (20, 42),
                ("sans-serif", 14).into_font().color(&RGBColor(90, 90, 90)),
            ))
            .map_err(chart_error)?;

        let bars = contributors.len().max(1) as u32;
        let y_max = contributors.iter().map(|c| c.frequency).max().unwrap_or(0);
        let y_top = y_max + (y_max / 10).max(1);

        let mut chart = ChartBuilder::on(&body)
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d((0u32..bars).into_segmented(), 0u64..y_top)
            .map_err(chart_error)?;

        let label = |value: &SegmentValue<u32>| match value {
            SegmentValue::CenterOf(i) => contributors
                .get(*i as usize)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            _ => String::new(),
        };

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(bars as usize)
            .x_label_formatter(&label)
            .y_desc("attribution #")
            .draw()
            .map_err(chart_error)?;

        chart
            .draw_series(contributors.iter().enumerate().map(|(i, c)| {
                let i = i as u32;
                let mut bar = Rectangle::new(
                    [(SegmentValue::Exact(i), 0), (SegmentValue::Exact(i + 1), c.frequency)],
                    Palette99::pick(i as usize).filled(),
                );
                bar.set_margin(0, 0, 12, 12);
                bar
            }))
            .map_err(chart_error)?;

        root.present().map_err(chart_error)?;
    }
    Ok(Chart { svg })
}

fn chart_error<E: std::fmt::Display>(err: E) -> AppError {
    AppError::Chart(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contributor(name: &str, frequency: u64) -> ContributorCount {
        ContributorCount {
            user_id: name.to_lowercase(),
            name: name.to_string(),
            frequency,
        }
    }

    #[test]
    fn renders_svg_with_names() {
        let chart = render_attribution_chart(&[contributor("Per Dahl", 12), contributor("Ann Berg", 4)]).unwrap();
        assert!(chart.svg.contains("<svg"));
        assert!(chart.svg.contains("Per Dahl"));
        assert!(chart.svg.contains("Ann Berg"));
        assert!(chart.svg.contains("attribution #"));
    }

    #[test]
    fn empty_chart_still_renders() {
        let chart = render_attribution_chart(&[]).unwrap();
        assert!(chart.svg.contains(CHART_TITLE));
    }
}
