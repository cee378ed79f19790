//! Feed-forward binary classifier over combined candidate+offer vectors.
//!
//! Two ReLU hidden layers with dropout and L2 regularization, sigmoid output,
//! trained with mini-batch Adam on binary cross-entropy. Small recruiting
//! datasets overfit easily, so training holds out a validation split and stops
//! early once validation loss stops improving.

use crate::config::ModelConfig;
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::distributions::Uniform;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-8;
const BCE_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    w1: Array2<f32>,
    b1: Array1<f32>,
    w2: Array2<f32>,
    b2: Array1<f32>,
    w3: Array2<f32>,
    b3: Array1<f32>,
}

/// Summary of one training run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingOutcome {
    pub epochs_run: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    pub train_accuracy: f32,
    pub val_accuracy: f32,
    pub stopped_early: bool,
}

/// Serialized weight snapshot. Records the input width so a snapshot written
/// against an older skill vocabulary can be rejected on load.
#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub input_width: usize,
    pub layers: Vec<LayerSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub rows: usize,
    pub cols: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl FeedForwardNetwork {
    /// Random (Glorot-uniform) initialization.
    pub fn new(input_width: usize, hidden: usize, hidden_2: usize) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            w1: glorot(&mut rng, input_width, hidden),
            b1: Array1::zeros(hidden),
            w2: glorot(&mut rng, hidden, hidden_2),
            b2: Array1::zeros(hidden_2),
            w3: glorot(&mut rng, hidden_2, 1),
            b3: Array1::zeros(1),
        }
    }

    pub fn input_width(&self) -> usize {
        self.w1.nrows()
    }

    /// Forward pass without dropout; returns one probability per input row.
    pub fn predict(&self, x: &Array2<f32>) -> Array1<f32> {
        let a1 = relu(&(x.dot(&self.w1) + &self.b1));
        let a2 = relu(&(a1.dot(&self.w2) + &self.b2));
        let out = sigmoid(&(a2.dot(&self.w3) + &self.b3));
        out.index_axis(Axis(1), 0).to_owned()
    }

    pub fn predict_one(&self, x: &[f32]) -> f32 {
        let input = Array1::from_vec(x.to_vec()).insert_axis(Axis(0));
        self.predict(&input)[0]
    }

    /// Mini-batch Adam training with an 80/20-style validation split and
    /// early stopping on validation loss.
    pub fn fit(&mut self, x: &Array2<f32>, y: &Array1<f32>, config: &ModelConfig) -> TrainingOutcome {
        let n = x.nrows();
        let mut rng = rand::thread_rng();

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);

        let n_val = ((n as f32) * config.validation_split).round() as usize;
        let (val_idx, train_idx) = indices.split_at(n_val.min(n.saturating_sub(1)));

        let x_train = x.select(Axis(0), train_idx);
        let y_train = y.select(Axis(0), train_idx);
        let x_val = x.select(Axis(0), val_idx);
        let y_val = y.select(Axis(0), val_idx);
        let has_val = !val_idx.is_empty();

        let mut opt = Optimizer::new(self);
        let mut outcome = TrainingOutcome::default();
        let mut best_monitor = f32::INFINITY;
        let mut epochs_without_improvement = 0;
        let mut order: Vec<usize> = (0..x_train.nrows()).collect();

        for epoch in 0..config.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(config.batch_size.max(1)) {
                let xb = x_train.select(Axis(0), batch);
                let yb = y_train.select(Axis(0), batch);
                self.train_step(&xb, &yb, config, &mut opt, &mut rng);
            }

            let (train_loss, train_acc) = self.evaluate(&x_train, &y_train);
            let (val_loss, val_acc) = if has_val {
                self.evaluate(&x_val, &y_val)
            } else {
                (train_loss, train_acc)
            };

            debug!(epoch, train_loss, val_loss, "Training epoch complete");

            outcome.epochs_run = epoch + 1;
            outcome.train_loss = train_loss;
            outcome.val_loss = val_loss;
            outcome.train_accuracy = train_acc;
            outcome.val_accuracy = val_acc;

            if best_monitor - val_loss > config.early_stopping_min_delta {
                best_monitor = val_loss;
                epochs_without_improvement = 0;
            } else {
                epochs_without_improvement += 1;
                if epochs_without_improvement >= config.early_stopping_patience {
                    outcome.stopped_early = true;
                    break;
                }
            }
        }

        outcome
    }

    /// One gradient step on a mini-batch (dropout active).
    fn train_step<R: Rng>(
        &mut self,
        x: &Array2<f32>,
        y: &Array1<f32>,
        config: &ModelConfig,
        opt: &mut Optimizer,
        rng: &mut R,
    ) {
        let batch = x.nrows() as f32;

        // Forward with dropout on the first hidden layer
        let z1 = x.dot(&self.w1) + &self.b1;
        let a1 = relu(&z1);
        let keep = 1.0 - config.dropout_rate;
        let mask = Array2::from_shape_fn(a1.raw_dim(), |_| {
            if rng.gen::<f32>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        });
        let a1d = &a1 * &mask;

        let z2 = a1d.dot(&self.w2) + &self.b2;
        let a2 = relu(&z2);
        let z3 = a2.dot(&self.w3) + &self.b3;
        let p = sigmoid(&z3);

        // Backward (BCE + sigmoid): dL/dz3 = (p - y) / batch
        let y_col = y.view().insert_axis(Axis(1));
        let dz3 = (&p - &y_col) / batch;

        let gw3 = a2.t().dot(&dz3) + &(&self.w3 * config.l2_penalty);
        let gb3 = dz3.sum_axis(Axis(0));

        let dz2 = dz3.dot(&self.w3.t()) * relu_grad(&z2);
        let gw2 = a1d.t().dot(&dz2) + &(&self.w2 * config.l2_penalty);
        let gb2 = dz2.sum_axis(Axis(0));

        let dz1 = (dz2.dot(&self.w2.t()) * &mask) * relu_grad(&z1);
        let gw1 = x.t().dot(&dz1) + &(&self.w1 * config.l2_penalty);
        let gb1 = dz1.sum_axis(Axis(0));

        opt.t += 1;
        let lr = config.learning_rate;
        opt.w1.step(&mut self.w1, &gw1, lr, opt.t);
        opt.b1.step(&mut self.b1, &gb1, lr, opt.t);
        opt.w2.step(&mut self.w2, &gw2, lr, opt.t);
        opt.b2.step(&mut self.b2, &gb2, lr, opt.t);
        opt.w3.step(&mut self.w3, &gw3, lr, opt.t);
        opt.b3.step(&mut self.b3, &gb3, lr, opt.t);
    }

    /// Mean binary cross-entropy and accuracy over a dataset.
    pub fn evaluate(&self, x: &Array2<f32>, y: &Array1<f32>) -> (f32, f32) {
        if x.nrows() == 0 {
            return (0.0, 0.0);
        }
        let p = self.predict(x);
        let mut loss = 0.0;
        let mut correct = 0usize;
        for (&pi, &yi) in p.iter().zip(y.iter()) {
            let pi = pi.clamp(BCE_EPSILON, 1.0 - BCE_EPSILON);
            loss -= yi * pi.ln() + (1.0 - yi) * (1.0 - pi).ln();
            if (pi > 0.5) == (yi > 0.5) {
                correct += 1;
            }
        }
        (loss / p.len() as f32, correct as f32 / p.len() as f32)
    }

    pub fn to_snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            input_width: self.input_width(),
            layers: vec![
                layer_snapshot(&self.w1, &self.b1),
                layer_snapshot(&self.w2, &self.b2),
                layer_snapshot(&self.w3, &self.b3),
            ],
        }
    }

    pub fn from_snapshot(snapshot: &NetworkSnapshot) -> Result<Self, String> {
        if snapshot.layers.len() != 3 {
            return Err(format!("expected 3 layers, found {}", snapshot.layers.len()));
        }
        let (w1, b1) = restore_layer(&snapshot.layers[0])?;
        let (w2, b2) = restore_layer(&snapshot.layers[1])?;
        let (w3, b3) = restore_layer(&snapshot.layers[2])?;

        if w1.nrows() != snapshot.input_width {
            return Err(format!(
                "layer width {} does not match recorded input width {}",
                w1.nrows(),
                snapshot.input_width
            ));
        }
        if w1.ncols() != b1.len() || w2.ncols() != b2.len() || w3.ncols() != b3.len() {
            return Err("bias width does not match layer width".to_string());
        }
        if w1.ncols() != w2.nrows() || w2.ncols() != w3.nrows() || w3.ncols() != 1 {
            return Err("layer widths do not chain".to_string());
        }

        Ok(Self { w1, b1, w2, b2, w3, b3 })
    }
}

fn layer_snapshot(w: &Array2<f32>, b: &Array1<f32>) -> LayerSnapshot {
    LayerSnapshot {
        rows: w.nrows(),
        cols: w.ncols(),
        weights: w.iter().copied().collect(),
        bias: b.to_vec(),
    }
}

fn restore_layer(layer: &LayerSnapshot) -> Result<(Array2<f32>, Array1<f32>), String> {
    let w = Array2::from_shape_vec((layer.rows, layer.cols), layer.weights.clone())
        .map_err(|e| e.to_string())?;
    let b = Array1::from_vec(layer.bias.clone());
    Ok((w, b))
}

fn glorot<R: Rng>(rng: &mut R, fan_in: usize, fan_out: usize) -> Array2<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.sample(dist))
}

fn relu(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| v.max(0.0))
}

fn relu_grad(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

fn sigmoid(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Adam state for every parameter of the network.
struct Optimizer {
    t: usize,
    w1: Adam<ndarray::Ix2>,
    b1: Adam<ndarray::Ix1>,
    w2: Adam<ndarray::Ix2>,
    b2: Adam<ndarray::Ix1>,
    w3: Adam<ndarray::Ix2>,
    b3: Adam<ndarray::Ix1>,
}

impl Optimizer {
    fn new(net: &FeedForwardNetwork) -> Self {
        Self {
            t: 0,
            w1: Adam::new(net.w1.raw_dim()),
            b1: Adam::new(net.b1.raw_dim()),
            w2: Adam::new(net.w2.raw_dim()),
            b2: Adam::new(net.b2.raw_dim()),
            w3: Adam::new(net.w3.raw_dim()),
            b3: Adam::new(net.b3.raw_dim()),
        }
    }
}

struct Adam<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Adam<D> {
    fn new(dim: D) -> Self {
        Self {
            m: Array::zeros(dim.clone()),
            v: Array::zeros(dim),
        }
    }

    fn step(&mut self, param: &mut Array<f32, D>, grad: &Array<f32, D>, lr: f32, t: usize) {
        self.m.zip_mut_with(grad, |m, &g| *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g);
        self.v.zip_mut_with(grad, |v, &g| *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g);

        let bias1 = 1.0 - ADAM_BETA1.powi(t as i32);
        let bias2 = 1.0 - ADAM_BETA2.powi(t as i32);

        Zip::from(&mut *param)
            .and(&self.m)
            .and(&self.v)
            .for_each(|p, &m, &v| {
                let m_hat = m / bias1;
                let v_hat = v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
            });
    }
}
