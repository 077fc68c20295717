use ndarray::Array2;
use rand::Rng;

use crate::rgba::Rgba;
use crate::utils::von_neumann_neighbors;

/// Lateral connection to an adjacent neuron of the same layer.
///
/// The neighbor is referenced by its grid coordinates, never by pointer, so a
/// connection stays valid for as long as the layer keeps its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborConnection {
    pub index_x: usize,
    pub index_y: usize,
    pub weight: Rgba,
}

impl NeighborConnection {
    /// Row-major index of the neighbor inside a layer of the given width.
    pub fn flat_index(&self, width: usize) -> usize {
        self.index_y * width + self.index_x
    }
}

/// A single grid position of a layer
#[derive(Debug, Clone, PartialEq)]
pub struct Neuron {
    pub index_x: usize,
    pub index_y: usize,

    /// One weight per neuron of the previous layer, shaped `(height, width)`
    /// of that layer. Empty on the input layer.
    pub weights: Array2<Rgba>,

    /// Zero to four lateral connections.
    pub neighbors: Vec<NeighborConnection>,
}

impl Neuron {
    pub fn new(index_x: usize, index_y: usize) -> Self {
        Neuron {
            index_x,
            index_y,
            weights: Array2::from_elem((0, 0), Rgba::ZERO),
            neighbors: Vec::new(),
        }
    }

    pub fn flat_index(&self, width: usize) -> usize {
        self.index_y * width + self.index_x
    }

    /// Allocates the feed-forward tensor for a previous layer of
    /// `prev_width x prev_height`, drawing from `N(0.1, 0.01)` clamped to `[0, 0.1]`.
    ///
    /// # Arguments
    ///
    /// * `prev_width` - Width of the previous layer
    /// * `prev_height` - Height of the previous layer
    /// * `rng` - Random source, seedable for reproducible networks
    pub fn init_weights<R: Rng + ?Sized>(
        &mut self,
        prev_width: usize,
        prev_height: usize,
        rng: &mut R,
    ) {
        self.weights = Array2::from_shape_fn((prev_height, prev_width), |_| {
            Rgba::random_normal(rng, 0.1, 0.01, 0.0, 0.1)
        });
    }

    /// Allocates a zeroed feed-forward tensor, filled later by an importer.
    pub fn reserve_weights(&mut self, prev_width: usize, prev_height: usize) {
        self.weights = Array2::from_elem((prev_height, prev_width), Rgba::ZERO);
    }

    /// Creates the lateral connections of this neuron inside a `width x height`
    /// grid, each weight drawn from `weight`.
    pub fn connect_neighbors(
        &mut self,
        width: usize,
        height: usize,
        mut weight: impl FnMut() -> Rgba,
    ) {
        self.neighbors = von_neumann_neighbors(self.index_x, self.index_y, width, height)
            .map(|(index_x, index_y)| NeighborConnection {
                index_x,
                index_y,
                weight: weight(),
            })
            .collect();
    }

    pub fn weight_count(&self) -> usize {
        self.weights.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_weights_follow_previous_layer_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut neuron = Neuron::new(0, 0);
        assert_eq!(neuron.weight_count(), 0);

        neuron.init_weights(3, 2, &mut rng);
        assert_eq!(neuron.weights.dim(), (2, 3));
        assert!(neuron.weights.iter().all(|w| !w.is_out_of_range(0.0, 0.1)));
    }

    #[test]
    fn test_neighbor_flat_index() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut neuron = Neuron::new(1, 1);
        neuron.connect_neighbors(3, 2, || Rgba::random_xavier(&mut rng, 8.0));

        let mut indices: Vec<usize> = neuron.neighbors.iter().map(|c| c.flat_index(3)).collect();
        indices.sort();
        // left, right and up; the row below does not exist
        assert_eq!(indices, vec![1, 3, 5]);
    }
}
