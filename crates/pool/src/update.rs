//! Per-cell-group compute kernel run alongside event delivery.
//!
//! Each cell group holds a small cable of compartments. An update applies
//! an implicit diffusion step, which means solving a tridiagonal system with
//! the Thomas algorithm. The kernel exists to give the exchange something
//! to overlap with; its numbers are never interpreted.

const COMPARTMENTS: usize = 64;
const COUPLING: f64 = 0.25;

#[derive(Debug, Clone)]
pub(crate) struct Cable {
    voltage: Vec<f64>,
    scratch: Vec<f64>,
    updates: u64,
}

impl Cable {
    pub(crate) fn new(seed: u32) -> Self {
        let voltage = (0..COMPARTMENTS)
            .map(|i| -65.0 + ((i as u32 ^ seed) % 7) as f64)
            .collect();
        Self {
            voltage,
            scratch: vec![0.0; COMPARTMENTS],
            updates: 0,
        }
    }

    /// Solve `(1 + 2c) v'_i - c v'_{i-1} - c v'_{i+1} = v_i` with sealed ends.
    pub(crate) fn update(&mut self) {
        let n = self.voltage.len();
        let off = -COUPLING;
        let diag = |i: usize| {
            if i == 0 || i == n - 1 {
                1.0 + COUPLING
            } else {
                1.0 + 2.0 * COUPLING
            }
        };

        // Forward sweep: scratch holds the modified upper diagonal.
        self.scratch[0] = off / diag(0);
        self.voltage[0] /= diag(0);
        for i in 1..n {
            let m = diag(i) - off * self.scratch[i - 1];
            self.scratch[i] = off / m;
            self.voltage[i] = (self.voltage[i] - off * self.voltage[i - 1]) / m;
        }
        // Back substitution.
        for i in (0..n - 1).rev() {
            self.voltage[i] -= self.scratch[i] * self.voltage[i + 1];
        }
        self.updates += 1;
    }

    pub(crate) fn updates(&self) -> u64 {
        self.updates
    }

    #[cfg(test)]
    fn voltage(&self) -> &[f64] {
        &self.voltage
    }
}
