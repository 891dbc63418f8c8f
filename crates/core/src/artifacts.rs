use crate::config::ensure_dir;
use crate::error::{RagError, Result};
use crate::table::Table;
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

const CHART_SIZE: (u32, u32) = (800, 480);

/// Writes report artifacts (tables, charts) under one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target(&self, filename: &str) -> Result<PathBuf> {
        let name = Path::new(filename);
        let plain = name.file_name().is_some_and(|file| file == name.as_os_str());
        if filename.trim().is_empty() || !plain {
            return Err(RagError::InvalidArgument(format!(
                "artifact filename must be a plain file name: {filename:?}"
            )));
        }
        Ok(self.dir.join(name))
    }

    pub fn save_table(&self, table: &Table, filename: &str) -> Result<PathBuf> {
        let path = self.target(filename)?;
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = table.row_count(), "table saved");
        Ok(path)
    }

    /// Renders `points` as a single SVG line series.
    pub fn save_line_chart(&self, points: &[(f64, f64)], filename: &str) -> Result<PathBuf> {
        if points.is_empty() {
            return Err(RagError::InvalidArgument("chart needs at least one point".to_string()));
        }
        let path = self.target(filename)?;
        let (x_range, y_range) = padded_ranges(points);

        {
            let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;
            let mut chart = ChartBuilder::on(&root)
                .margin(20)
                .build_cartesian_2d(x_range, y_range)
                .map_err(render_error)?;
            chart
                .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
                .map_err(render_error)?;
            root.present().map_err(render_error)?;
        }

        info!(path = %path.display(), points = points.len(), "figure saved");
        Ok(path)
    }
}

fn padded_ranges(points: &[(f64, f64)]) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
    let span = |values: Vec<f64>| {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if (max - min).abs() < f64::EPSILON {
            (min - 1.0)..(max + 1.0)
        } else {
            min..max
        }
    };
    (
        span(points.iter().map(|(x, _)| *x).collect()),
        span(points.iter().map(|(_, y)| *y).collect()),
    )
}

fn render_error(error: impl std::fmt::Display) -> RagError {
    RagError::Render(error.to_string())
}
