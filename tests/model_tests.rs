use approx::assert_relative_eq;
use ndarray::Array2;
use pixgrid::{
    CpuEngine, LayerConfig, LayerType, Loss, Network, NetworkBuilder, NetworkParams,
    PropagationEngine, Rgba,
};

fn small_network(seed: u64) -> Network {
    Network::new(
        vec![
            LayerConfig::new(LayerType::Input, 2, 2),
            LayerConfig::new(LayerType::Hidden, 3, 2),
            LayerConfig::new(LayerType::Output, 3, 3),
        ],
        Some(seed),
    )
    .unwrap()
}

fn gradient(width: usize, height: usize) -> Array2<Rgba> {
    Array2::from_shape_fn((height, width), |(y, x)| {
        let v = (x + y) as f32 / (width + height) as f32;
        Rgba::new(v, 1.0 - v, 0.5, 1.0)
    })
}

fn weights_of(network: &Network) -> Vec<Rgba> {
    network
        .layers
        .iter()
        .flat_map(|l| l.neurons.iter())
        .flat_map(|n| n.weights.iter().copied().chain(n.neighbors.iter().map(|c| c.weight)))
        .collect()
}

#[test]
fn test_forward_output_shape() {
    let mut network = small_network(3);
    let mut engine = CpuEngine::new(false);
    let output = engine.forward(&mut network, &gradient(2, 2)).unwrap();
    assert_eq!(output.dim(), (3, 3));
    assert!(output.iter().all(|v| v.is_finite()));

    // input grid of the wrong shape
    assert!(engine.forward(&mut network, &gradient(3, 2)).is_err());
}

#[test]
fn test_forward_is_deterministic() {
    let mut a = small_network(11);
    let mut b = small_network(11);
    let input = gradient(2, 2);
    let mut engine = CpuEngine::new(true);
    assert_eq!(
        engine.forward(&mut a, &input).unwrap(),
        engine.forward(&mut b, &input).unwrap()
    );
}

#[test]
fn test_zero_learning_rate_keeps_weights() {
    let mut network = small_network(5);
    let before = weights_of(&network);
    let mut engine = CpuEngine::new(false);

    engine.forward(&mut network, &gradient(2, 2)).unwrap();
    engine.backward(&mut network, &gradient(3, 3), -10.0, 10.0).unwrap();
    engine.update_weights(&mut network, 0.0).unwrap();

    let after = weights_of(&network);
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.to_array().map(f32::to_bits), a.to_array().map(f32::to_bits));
    }
}

#[test]
fn test_training_changes_output_weights() {
    let mut network = small_network(9);
    let initial: Vec<Rgba> = network
        .output_layer()
        .neurons
        .iter()
        .flat_map(|n| n.weights.iter().copied())
        .collect();
    let input = gradient(2, 2);
    let target = Array2::from_elem((3, 3), Rgba::splat(0.9));
    let mut engine = CpuEngine::new(true);

    let mut loss = f32::NAN;
    for _ in 0..2 {
        let output = engine.forward(&mut network, &input).unwrap();
        loss = Loss::MeanSquaredError.calculate(&output, &target).unwrap();
        engine.backward(&mut network, &target, -10.0, 10.0).unwrap();
        engine.update_weights(&mut network, 0.1).unwrap();
    }

    let trained: Vec<Rgba> = network
        .output_layer()
        .neurons
        .iter()
        .flat_map(|n| n.weights.iter().copied())
        .collect();
    assert_ne!(initial, trained);
    assert!(loss.is_finite());
    assert!(loss >= 0.0);
}

#[test]
fn test_builder_uses_hyperparameters() {
    let params = NetworkParams {
        input_size_x: 4,
        input_size_y: 2,
        hidden_size_x: 3,
        hidden_size_y: 3,
        output_size_x: 5,
        output_size_y: 4,
        hiddens_count: 2,
        ..NetworkParams::default()
    };
    let network = NetworkBuilder::new(&params).seed(Some(1)).build().unwrap();

    let shapes: Vec<(LayerType, usize, usize)> = network
        .layers
        .iter()
        .map(|l| (l.layer_type, l.width, l.height))
        .collect();
    assert_eq!(
        shapes,
        vec![
            (LayerType::Input, 4, 2),
            (LayerType::Hidden, 3, 3),
            (LayerType::Hidden, 3, 3),
            (LayerType::Output, 5, 4),
        ]
    );
    assert_eq!(network.max_weights, 9);
    assert_eq!(network.max_neighbors(), 4);
    assert_eq!(network.max_neurons(), 20);
}

#[test]
fn test_invalid_topologies() {
    assert!(Network::new(vec![LayerConfig::new(LayerType::Input, 2, 2)], None).is_err());
    assert!(Network::new(
        vec![
            LayerConfig::new(LayerType::Hidden, 2, 2),
            LayerConfig::new(LayerType::Output, 2, 2),
        ],
        None
    )
    .is_err());
    assert!(Network::new(
        vec![
            LayerConfig::new(LayerType::Input, 0, 2),
            LayerConfig::new(LayerType::Output, 2, 2),
        ],
        None
    )
    .is_err());

    let mut network = small_network(1);
    network.layers[1].next = None;
    assert!(network.forward(false).is_err());
}

#[test]
fn test_loss_of_identical_grids_is_zero() {
    let grid = gradient(3, 3);
    assert_relative_eq!(Loss::MeanSquaredError.calculate(&grid, &grid).unwrap(), 0.0);
}
