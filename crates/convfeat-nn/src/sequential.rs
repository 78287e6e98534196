use std::io::{self, Read};

use convfeat_core::Tensor;
use convfeat_runtime::ThreadPool;

use crate::layers::Layer;

/// Ordered composition of layers.
///
/// `forward` threads the tensor through each layer in order; `load` feeds
/// the weight stream through each layer in the same order, so stream layout
/// is fixed entirely by declaration order. A `Sequential` is itself a
/// layer, so sequences nest.
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    pub fn new() -> Self {
        Sequential { layers: Vec::new() }
    }

    /// Append a layer.
    pub fn add(mut self, layer: impl Layer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Layer for Sequential {
    fn forward(&self, x: Tensor<f32>, pool: &ThreadPool) -> Tensor<f32> {
        let mut x = x;
        for layer in &self.layers {
            x = layer.forward(x, pool);
        }
        x
    }

    fn load(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        for layer in &mut self.layers {
            layer.load(reader)?;
        }
        Ok(())
    }
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new()
    }
}
