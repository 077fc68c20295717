use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::layer::LayerType;
use crate::model::Network;
use crate::rgba::Rgba;

const INDEX_COLUMNS: usize = 3;

fn csv_error(path: &Path, e: csv::Error) -> Error {
    Error::ImportExport(format!("{}: {e}", path.display()))
}

/// Writes one feed-forward row per neuron, then one row per lateral
/// connection. Rows are padded to the widest feed-forward row.
pub fn write_weights(path: &Path, network: &Network) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    let columns = INDEX_COLUMNS + 4 * network.max_weights;

    let mut header = vec![
        "layer_index".to_string(),
        "neuron_index".to_string(),
        "neighbor_index".to_string(),
    ];
    for i in 0..network.max_weights {
        for channel in ["r", "g", "b", "a"] {
            header.push(format!("w{i}_{channel}"));
        }
    }
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    let mut row: Vec<String> = Vec::with_capacity(columns);
    for (layer_index, layer) in network.layers.iter().enumerate() {
        if layer.layer_type == LayerType::Input {
            continue;
        }
        for (neuron_index, neuron) in layer.neurons.iter().enumerate() {
            row.clear();
            row.extend([layer_index.to_string(), neuron_index.to_string(), String::new()]);
            push_weights(&mut row, neuron.weights.iter().copied());
            row.resize(columns, String::new());
            writer.write_record(&row).map_err(|e| csv_error(path, e))?;

            for conn in &neuron.neighbors {
                row.clear();
                row.extend([
                    layer_index.to_string(),
                    neuron_index.to_string(),
                    conn.flat_index(layer.width).to_string(),
                ]);
                push_weights(&mut row, std::iter::once(conn.weight));
                row.resize(columns.max(INDEX_COLUMNS + 4), String::new());
                writer.write_record(&row).map_err(|e| csv_error(path, e))?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn push_weights(row: &mut Vec<String>, weights: impl Iterator<Item = Rgba>) {
    for weight in weights {
        row.extend(weight.to_array().iter().map(|v| v.to_string()));
    }
}

/// Fills the weights of a network whose topology is already built.
pub fn read_weights(path: &Path, network: &mut Network) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let expected_rows: usize = network
        .layers
        .iter()
        .filter(|layer| layer.layer_type != LayerType::Input)
        .map(|layer| layer.size())
        .sum();
    let expected_connections: usize = network
        .layers
        .iter()
        .flat_map(|layer| layer.neurons.iter())
        .map(|neuron| neuron.neighbors.len())
        .sum();
    let (mut rows, mut connections) = (0, 0);
    let mut seen_neurons: Vec<Vec<bool>> = network
        .layers
        .iter()
        .map(|layer| vec![false; layer.size()])
        .collect();
    let mut seen_connections: HashSet<(usize, usize, usize)> = HashSet::new();

    for (line, record) in reader.records().enumerate() {
        // header is line 1
        let line = line + 2;
        let record = record.map_err(|e| csv_error(path, e))?;
        let fail = |message: String| Error::ImportExport(format!("{} line {line}: {message}", path.display()));
        if record.len() < INDEX_COLUMNS {
            return Err(fail(format!("expected at least {INDEX_COLUMNS} columns")));
        }

        let layer_index = parse_index(&record[0]).map_err(&fail)?;
        let neuron_index = parse_index(&record[1]).map_err(&fail)?;
        let layer = network
            .layers
            .get_mut(layer_index)
            .filter(|layer| layer.layer_type != LayerType::Input)
            .ok_or_else(|| fail(format!("no weighted layer {layer_index}")))?;
        let width = layer.width;
        let neuron = layer
            .neurons
            .get_mut(neuron_index)
            .ok_or_else(|| fail(format!("no neuron {neuron_index} in layer {layer_index}")))?;
        let weights = parse_weights(record.iter().skip(INDEX_COLUMNS)).map_err(&fail)?;

        if record[2].trim().is_empty() {
            let seen = &mut seen_neurons[layer_index][neuron_index];
            if *seen {
                return Err(fail(format!("duplicate row for neuron {neuron_index} of layer {layer_index}")));
            }
            *seen = true;
            if weights.len() != neuron.weights.len() {
                return Err(fail(format!(
                    "{} weights for a neuron expecting {}",
                    weights.len(),
                    neuron.weights.len()
                )));
            }
            for (slot, weight) in neuron.weights.iter_mut().zip(weights) {
                *slot = weight;
            }
            rows += 1;
        } else {
            let neighbor_index = parse_index(&record[2]).map_err(&fail)?;
            if !seen_connections.insert((layer_index, neuron_index, neighbor_index)) {
                return Err(fail(format!(
                    "duplicate row for neighbor {neighbor_index} of neuron {neuron_index} in layer {layer_index}"
                )));
            }
            let conn = neuron
                .neighbors
                .iter_mut()
                .find(|conn| conn.flat_index(width) == neighbor_index)
                .ok_or_else(|| fail(format!("neuron {neuron_index} has no neighbor {neighbor_index}")))?;
            conn.weight = *weights
                .first()
                .ok_or_else(|| fail("neighbor row without a weight".to_string()))?;
            connections += 1;
        }
    }

    if rows != expected_rows || connections != expected_connections {
        return Err(Error::ImportExport(format!(
            "{} holds {rows} neuron rows and {connections} neighbor rows, expected {expected_rows} and {expected_connections}",
            path.display()
        )));
    }
    Ok(())
}

fn parse_index(value: &str) -> std::result::Result<usize, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid index '{value}'"))
}

/// Parses RGBA quadruplets until the first empty padding cell.
fn parse_weights<'a>(cells: impl Iterator<Item = &'a str>) -> std::result::Result<Vec<Rgba>, String> {
    let values: Vec<&str> = cells.map(str::trim).take_while(|cell| !cell.is_empty()).collect();
    if values.len() % 4 != 0 {
        return Err(format!("{} weight values is not a multiple of 4", values.len()));
    }
    values
        .chunks(4)
        .map(|quad| {
            let mut channels = [0.0f32; 4];
            for (channel, cell) in channels.iter_mut().zip(quad) {
                *channel = cell.parse().map_err(|_| format!("invalid weight '{cell}'"))?;
            }
            Ok(Rgba::from_array(channels))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weights_stops_at_padding() {
        let cells = ["0.5", "1", "-2", "0", "", "", "", ""];
        let weights = parse_weights(cells.iter().copied()).unwrap();
        assert_eq!(weights, vec![Rgba::new(0.5, 1.0, -2.0, 0.0)]);

        assert!(parse_weights(["1", "2", "3"].iter().copied()).is_err());
        assert!(parse_weights(["1", "2", "x", "4"].iter().copied()).is_err());
    }
}
