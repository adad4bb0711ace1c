use serde::{Serialize, Deserialize};

/// Per-epoch mean metrics, in epoch order. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub acc: Vec<f64>,
    pub val_acc: Vec<f64>,
}

impl History {
    pub fn push(&mut self, loss: f64, val_loss: f64, acc: f64, val_acc: f64) {
        self.loss.push(loss);
        self.val_loss.push(val_loss);
        self.acc.push(acc);
        self.val_acc.push(val_acc);
    }

    pub fn len(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }
}
