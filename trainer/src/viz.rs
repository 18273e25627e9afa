use std::collections::BTreeMap;

use ndarray::Array2;

/// Receives the visual payloads routines produce.
pub trait Visualizer {
    /// Adds a batch of images, one flattened image per row, with values in `[0, 1]`.
    fn add_image(&mut self, name: &str, images: &Array2<f32>);

    /// Adds a scatter of points, one point per row, optionally colored by label.
    fn add_scatter(&mut self, name: &str, points: &Array2<f32>, labels: Option<&Array2<f32>>);

    /// Adds named series of values to histogram together.
    fn add_histogram(&mut self, name: &str, series: &[(&str, Vec<f32>)]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVisualizer;

impl Visualizer for NoopVisualizer {
    fn add_image(&mut self, _name: &str, _images: &Array2<f32>) {}

    fn add_scatter(&mut self, _name: &str, _points: &Array2<f32>, _labels: Option<&Array2<f32>>) {}

    fn add_histogram(&mut self, _name: &str, _series: &[(&str, Vec<f32>)]) {}
}

/// A recorded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Image(Array2<f32>),
    Scatter {
        points: Array2<f32>,
        labels: Option<Array2<f32>>,
    },
    Histogram(Vec<(String, Vec<f32>)>),
}

/// Keeps the last payload of every name.
#[derive(Debug, Default, Clone)]
pub struct RecordingVisualizer {
    payloads: BTreeMap<String, Payload>,
}

impl RecordingVisualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Payload> {
        self.payloads.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.payloads.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.payloads.clear();
    }
}

impl Visualizer for RecordingVisualizer {
    fn add_image(&mut self, name: &str, images: &Array2<f32>) {
        self.payloads
            .insert(name.to_string(), Payload::Image(images.clone()));
    }

    fn add_scatter(&mut self, name: &str, points: &Array2<f32>, labels: Option<&Array2<f32>>) {
        let payload = Payload::Scatter {
            points: points.clone(),
            labels: labels.cloned(),
        };

        self.payloads.insert(name.to_string(), payload);
    }

    fn add_histogram(&mut self, name: &str, series: &[(&str, Vec<f32>)]) {
        let series = series
            .iter()
            .map(|(label, values)| (label.to_string(), values.clone()))
            .collect();

        self.payloads
            .insert(name.to_string(), Payload::Histogram(series));
    }
}
