//! Renderer-neutral figures built from monitor state.

use crate::{monitor::MetricsSnapshot, signal::PoincarePair, stats};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
    /// Fixed `[min, max]`; the renderer autoscales when absent.
    pub range: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub radius: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(ScatterSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Scatter(scatter) => &scatter.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Bounds over every series, `([x_min, x_max], [y_min, y_max])`, honouring fixed axis ranges.
    pub fn bounds(&self) -> Option<([f64; 2], [f64; 2])> {
        let (x, y) = point_bounds(self.series.iter().flat_map(|s| s.points().iter()))?;
        Some((self.x.range.unwrap_or(x), self.y.range.unwrap_or(y)))
    }
}

fn point_bounds<'a>(points: impl IntoIterator<Item = &'a [f64; 2]>) -> Option<([f64; 2], [f64; 2])> {
    let mut points = points.into_iter();
    let first = points.next()?;
    let (mut x, mut y) = ([first[0], first[0]], [first[1], first[1]]);
    for p in points {
        x = [x[0].min(p[0]), x[1].max(p[0])];
        y = [y[0].min(p[1]), y[1].max(p[1])];
    }
    Some((x, y))
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket_size).floor() as usize)
        .take_while(|&start| start < points.len())
        .map(|start| points[start])
        .collect()
}

/// Display range for a waveform: 1st to 99th percentile, padded by 10 % of
/// the span but never less than `min_margin`.
pub fn waveform_range(values: &[f64], min_margin: f64) -> Option<[f64; 2]> {
    let low = stats::percentile(values, 1.0)?;
    let high = stats::percentile(values, 99.0)?;
    let margin = ((high - low) * 0.1).max(min_margin);
    Some([low - margin, high + margin])
}

/// Cleaned waveform of `snapshot` against seconds, ending at the tick time.
pub fn waveform_figure(snapshot: &MetricsSnapshot, sample_rate_hz: f64, max_points: usize) -> Figure {
    let dt = 1.0 / sample_rate_hz.max(1.0);
    let n = snapshot.waveform.len();
    let start = snapshot.t - n.saturating_sub(1) as f64 * dt;
    let points: Vec<[f64; 2]> = snapshot
        .waveform
        .iter()
        .enumerate()
        .map(|(i, v)| [start + i as f64 * dt, *v])
        .collect();

    let title = match snapshot.bpm.current() {
        Some(bpm) => format!("ECG ({}) {bpm:.0} BPM", snapshot.quality),
        None => format!("ECG ({}) -- BPM", snapshot.quality),
    };
    let mut fig = Figure::new(Some(title));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("filtered (counts)".into());
    fig.y.range = waveform_range(&snapshot.waveform, 100.0);
    fig.add_series(Series::Line(LineSeries {
        name: "ECG".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 2.0,
            color: Color(0x00FFFF),
        },
    }));
    fig
}

/// Poincaré scatter of consecutive RR intervals in milliseconds.
pub fn poincare_figure(pairs: &[PoincarePair]) -> Figure {
    let points: Vec<[f64; 2]> = pairs
        .iter()
        .map(|p| [p.prev * 1000.0, p.next * 1000.0])
        .collect();
    let mut fig = Figure::new(Some("Poincare plot".to_string()));
    fig.x.label = Some("RR(n) (ms)".into());
    fig.y.label = Some("RR(n+1) (ms)".into());
    if let Some((x, y)) = point_bounds(&points) {
        // square axes so the identity line sits on the diagonal
        let lo = x[0].min(y[0]) - 50.0;
        let hi = x[1].max(y[1]) + 50.0;
        fig.x.range = Some([lo, hi]);
        fig.y.range = Some([lo, hi]);
        fig.add_series(Series::Line(LineSeries {
            name: "identity".into(),
            points: vec![[lo, lo], [hi, hi]],
            style: Style {
                width: 1.0,
                color: Color(0x888888),
            },
        }));
    }
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "RR pairs".into(),
        points,
        radius: 4,
        color: Color(0xFF0077),
    }));
    fig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::BpmReading;

    #[test]
    fn decimation_caps_point_count() {
        let points: Vec<[f64; 2]> = (0..1500).map(|i| [i as f64, 0.0]).collect();
        let out = decimate_points(&points, 500);
        assert_eq!(out.len(), 500);
        assert_eq!(out[0], [0.0, 0.0]);
        assert_eq!(decimate_points(&points[..10], 500).len(), 10);
    }

    #[test]
    fn waveform_axis_ends_at_tick_time() {
        let snapshot = MetricsSnapshot {
            t: 10.0,
            waveform: (0..200).map(|i| (i % 20) as f64).collect(),
            bpm: BpmReading::Current { bpm: 72.0 },
            ..MetricsSnapshot::default()
        };
        let fig = waveform_figure(&snapshot, 200.0, 1000);
        let points = fig.series[0].points();
        assert_eq!(points.len(), 200);
        assert!((points[199][0] - 10.0).abs() < 1e-9);
        assert!((points[0][0] - (10.0 - 199.0 / 200.0)).abs() < 1e-9);
        assert!(fig.title.unwrap().contains("72 BPM"));
    }

    #[test]
    fn waveform_range_has_minimum_margin() {
        let range = waveform_range(&[0.0, 10.0], 100.0).unwrap();
        assert!(range[0] < -99.0 && range[1] > 109.0);
        assert!(waveform_range(&[], 100.0).is_none());
    }

    #[test]
    fn poincare_is_square_with_identity() {
        let pairs = vec![
            PoincarePair {
                prev: 0.8,
                next: 0.82,
            },
            PoincarePair {
                prev: 0.82,
                next: 0.78,
            },
        ];
        let fig = poincare_figure(&pairs);
        assert_eq!(fig.series.len(), 2);
        assert_eq!(fig.x.range, fig.y.range);
        match &fig.series[1] {
            Series::Scatter(s) => {
                assert!((s.points[0][0] - 800.0).abs() < 1e-9);
                assert!((s.points[0][1] - 820.0).abs() < 1e-9);
            }
            other => panic!("unexpected series {other:?}"),
        }
        assert_eq!(poincare_figure(&[]).series.len(), 1);
    }
}
