use std::fs;

use approx::assert_abs_diff_eq;
use pixgrid::persistence::{self, csv_path_for, NetworkMetadata};
use pixgrid::{ActivationType, Context, Error, NetworkBuilder, NetworkParams};
use tempfile::tempdir;

fn params() -> NetworkParams {
    NetworkParams {
        input_size_x: 2,
        input_size_y: 2,
        hidden_size_x: 3,
        hidden_size_y: 2,
        output_size_x: 3,
        output_size_y: 3,
        hiddens_count: 1,
        learning_rate: 0.05,
        hidden_activation_function: ActivationType::Tanh,
        output_activation_function: ActivationType::Sigmoid,
        ..NetworkParams::default()
    }
}

#[test]
fn test_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.json");
    let params = params();
    let network = NetworkBuilder::new(&params).seed(Some(21)).build().unwrap();

    persistence::save_network(&path, &network, &params).unwrap();
    assert!(csv_path_for(&path).exists());

    let (loaded, loaded_params) = persistence::load_network(&path).unwrap();
    assert_eq!(loaded_params, params);
    assert_eq!(loaded.max_weights, network.max_weights);
    assert_eq!(loaded.layers.len(), network.layers.len());

    for (a, b) in network.layers.iter().zip(&loaded.layers) {
        assert_eq!(a.layer_type, b.layer_type);
        assert_eq!((a.width, a.height), (b.width, b.height));
        assert_eq!(a.activation, b.activation);
        for (na, nb) in a.neurons.iter().zip(&b.neurons) {
            assert_eq!(na.weights.dim(), nb.weights.dim());
            for (wa, wb) in na.weights.iter().zip(nb.weights.iter()) {
                for (x, y) in wa.to_array().iter().zip(wb.to_array()) {
                    assert_abs_diff_eq!(*x, y, epsilon = 1e-6);
                }
            }
            assert_eq!(na.neighbors.len(), nb.neighbors.len());
            for (ca, cb) in na.neighbors.iter().zip(&nb.neighbors) {
                assert_eq!((ca.index_x, ca.index_y), (cb.index_x, cb.index_y));
                for (x, y) in ca.weight.to_array().iter().zip(cb.weight.to_array()) {
                    assert_abs_diff_eq!(*x, y, epsilon = 1e-6);
                }
            }
        }
    }
}

#[test]
fn test_metadata_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.json");
    let params = params();
    let network = NetworkBuilder::new(&params).seed(Some(2)).build().unwrap();
    persistence::save_network(&path, &network, &params).unwrap();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["max_weights"], 6);
    assert_eq!(json["layers"][0]["type"], "LayerInput");
    assert_eq!(json["layers"][1]["size_x"], 3);
    assert_eq!(json["layers"][1]["size_y"], 2);
    assert_eq!(json["layers"][2]["neurons"], 9);
    assert_eq!(json["parameters"]["hidden_activation_function"], "Tanh");

    let csv = fs::read_to_string(csv_path_for(&path)).unwrap();
    let mut lines = csv.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("layer_index,neuron_index,neighbor_index,w0_r"));
    assert_eq!(header.split(',').count(), 3 + 4 * 6);
    // 6 hidden and 9 output neurons, 7 + 12 lateral connections
    assert_eq!(lines.count(), 6 + 9 + 7 * 2 + 12 * 2);
}

#[test]
fn test_version_mismatch_is_tolerated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.json");
    let params = params();
    let network = NetworkBuilder::new(&params).seed(Some(3)).build().unwrap();
    persistence::save_network(&path, &network, &params).unwrap();

    let mut metadata: NetworkMetadata = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    metadata.version = "0.0.0-old".to_string();
    fs::write(&path, serde_json::to_string(&metadata).unwrap()).unwrap();

    assert!(persistence::load_network(&path).is_ok());
}

#[test]
fn test_missing_or_truncated_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.json");
    assert!(matches!(persistence::load_network(&path), Err(Error::ImportExport(_))));

    let params = params();
    let network = NetworkBuilder::new(&params).seed(Some(4)).build().unwrap();
    persistence::save_network(&path, &network, &params).unwrap();

    let csv_path = csv_path_for(&path);
    let csv = fs::read_to_string(&csv_path).unwrap();

    // neuron 0 row written twice, neuron 1 row missing
    let first = csv.lines().find(|l| l.starts_with("1,0,,")).unwrap();
    let duplicated: Vec<&str> = csv
        .lines()
        .map(|l| if l.starts_with("1,1,,") { first } else { l })
        .collect();
    fs::write(&csv_path, duplicated.join("\n")).unwrap();
    assert!(matches!(persistence::load_network(&path), Err(Error::ImportExport(_))));

    // a repeated neighbor row is rejected too
    let neighbor = csv.lines().find(|l| l.starts_with("1,0,") && !l.starts_with("1,0,,")).unwrap();
    let mut repeated: Vec<&str> = csv.lines().collect();
    repeated.push(neighbor);
    fs::write(&csv_path, repeated.join("\n")).unwrap();
    assert!(matches!(persistence::load_network(&path), Err(Error::ImportExport(_))));

    let truncated: Vec<&str> = csv.lines().take(5).collect();
    fs::write(&csv_path, truncated.join("\n")).unwrap();
    assert!(matches!(persistence::load_network(&path), Err(Error::ImportExport(_))));

    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(persistence::load_network(&path), Err(Error::ImportExport(_))));
}

#[test]
fn test_create_or_import() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.json");

    let mut ctx = Context::default();
    ctx.network_params = params();
    ctx.app_params.network_to_import = Some(path.clone());
    ctx.app_params.network_to_export = Some(path.clone());
    ctx.app_params.seed = Some(8);

    // nothing to import yet
    let created = persistence::create_or_import(&mut ctx).unwrap();
    persistence::export_network(&created, &ctx).unwrap();

    let mut other = Context::default();
    other.app_params.network_to_import = Some(path);
    let imported = persistence::create_or_import(&mut other).unwrap();
    assert_eq!(other.network_params, params());
    assert_eq!(imported.layers.len(), created.layers.len());
}
