use edge_inference::{
    AppendOutcome, InferenceError, InferenceResult, Prediction, QueryOptions, Regressor,
    RetentionFlags,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::cell::Cell;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

type MeanFn = Box<dyn Fn(&[f64]) -> f64>;

/// Regressor with a fixed mean function and a constant variance that counts
/// its queries and records appended rows.
pub(crate) struct ScriptedRegressor {
    input_dim: usize,
    variance: f64,
    mean: MeanFn,
    calls: Cell<usize>,
    appended: Vec<(Vec<f64>, f64, RetentionFlags)>,
    train_x: Array2<f64>,
    train_y: Array1<f64>,
}

impl ScriptedRegressor {
    pub(crate) fn new(
        input_dim: usize,
        variance: f64,
        mean: impl Fn(&[f64]) -> f64 + 'static,
    ) -> Self {
        Self {
            input_dim,
            variance,
            mean: Box::new(mean),
            calls: Cell::new(0),
            appended: Vec::new(),
            train_x: Array2::zeros((0, input_dim)),
            train_y: Array1::zeros(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.get()
    }

    pub(crate) fn appended(&self) -> &[(Vec<f64>, f64, RetentionFlags)] {
        &self.appended
    }
}

impl Regressor for ScriptedRegressor {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn append_data(
        &mut self,
        inputs: ArrayView2<'_, f64>,
        targets: ArrayView1<'_, f64>,
        flags: &[RetentionFlags],
    ) -> InferenceResult<AppendOutcome> {
        if inputs.ncols() != self.input_dim {
            return Err(InferenceError::DimensionMismatch {
                expected: self.input_dim,
                received: inputs.ncols(),
            });
        }
        for ((input, target), flags) in inputs.rows().into_iter().zip(targets).zip(flags) {
            self.appended.push((input.to_vec(), *target, *flags));
        }
        Ok(AppendOutcome {
            appended: inputs.nrows(),
            evicted: 0,
        })
    }

    fn query(
        &self,
        inputs: ArrayView2<'_, f64>,
        options: QueryOptions,
    ) -> InferenceResult<Prediction> {
        self.calls.set(self.calls.get() + 1);
        let rows = inputs.nrows();
        let mean = inputs
            .rows()
            .into_iter()
            .map(|row| (self.mean)(&row.to_vec()))
            .collect::<Array1<f64>>();
        Ok(Prediction {
            mean,
            variance: options
                .variance
                .then(|| Array1::from_elem(rows, self.variance)),
            covariance_matrix: options
                .covariance_matrix
                .then(|| Array2::from_diag_elem(rows, self.variance)),
        })
    }

    fn train_x(&self) -> ArrayView2<'_, f64> {
        self.train_x.view()
    }

    fn train_y(&self) -> ArrayView1<'_, f64> {
        self.train_y.view()
    }
}

/// In-memory log sink for a scoped `tracing` subscriber.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Runs `f` with a WARN-level subscriber writing into this sink.
    pub(crate) fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub(crate) fn count(&self, needle: &str) -> usize {
        let buffer = self.buffer.lock().expect("log buffer");
        String::from_utf8_lossy(&buffer).matches(needle).count()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.buffer
            .lock()
            .expect("log buffer")
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
