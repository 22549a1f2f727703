//! Result writer for forest evaluations and trained models.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tessera_rf::{DataFrame, EvaluationReport, RandomForest};
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::ExperimentName;

/// Writes evaluation reports and models for one experiment.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_scores.csv`,
/// `{experiment}_confusion.json` and `{experiment}_model.bin`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Path of the per-row scores table.
    pub fn scores_path(&self) -> PathBuf {
        self.artifact_path("scores.csv")
    }

    /// Path of the confusion matrix summary.
    pub fn confusion_path(&self) -> PathBuf {
        self.artifact_path("confusion.json")
    }

    /// Path of the persisted model.
    pub fn model_path(&self) -> PathBuf {
        self.artifact_path("model.bin")
    }

    fn artifact_path(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}", self.experiment.as_str()))
    }

    /// Evaluate `forest` on `data` and write the scores table and the
    /// confusion summary.
    ///
    /// The scores table has columns `row`, `true_label`, `predicted_label`,
    /// then one probability column per forest class label (0.0 when the class
    /// received no votes).
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::Forest`] | Evaluation fails (untrained forest, factor mismatch, ...) |
    /// | [`IoError::WriteCsv`] | The scores table cannot be written |
    /// | [`IoError::Json`] | The confusion summary cannot be encoded |
    /// | [`IoError::WriteFile`] | The confusion summary cannot be written |
    #[instrument(skip_all, fields(experiment = %self.experiment, n_rows = data.n_rows()))]
    pub fn generate_results(
        &self,
        forest: &RandomForest,
        data: &DataFrame,
    ) -> Result<EvaluationReport, IoError> {
        let report = forest.evaluate(data)?;
        self.write_scores(forest.class_labels(), &report)?;
        self.write_confusion(&report)?;
        info!(
            accuracy = report.accuracy(),
            balanced_accuracy = report.balanced_accuracy(),
            "evaluation results written"
        );
        Ok(report)
    }

    fn write_scores(
        &self,
        class_labels: &[String],
        report: &EvaluationReport,
    ) -> Result<(), IoError> {
        let path = self.scores_path();
        let csv_err = |e: csv::Error| IoError::WriteCsv {
            path: path.clone(),
            source: e,
        };
        let mut wtr = csv::Writer::from_path(&path).map_err(csv_err)?;

        let mut header = vec!["row", "true_label", "predicted_label"];
        header.extend(class_labels.iter().map(String::as_str));
        wtr.write_record(&header).map_err(csv_err)?;

        for row in &report.rows {
            let mut record = vec![
                row.row.to_string(),
                row.true_label.clone(),
                row.predicted_label.clone(),
            ];
            record.extend(
                class_labels
                    .iter()
                    .map(|label| row.scores.get(label).copied().unwrap_or(0.0).to_string()),
            );
            wtr.write_record(&record).map_err(csv_err)?;
        }

        wtr.flush().map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        debug!(path = %path.display(), rows = report.rows.len(), "scores written");
        Ok(())
    }

    fn write_confusion(&self, report: &EvaluationReport) -> Result<(), IoError> {
        let path = self.confusion_path();
        let confusion = &report.confusion;
        let metrics = confusion.class_metrics();

        let artifact = ConfusionArtifact {
            experiment: self.experiment.as_str(),
            n_rows: report.rows.len(),
            labels: confusion.labels(),
            matrix: confusion.as_rows(),
            accuracy: report.accuracy(),
            balanced_accuracy: report.balanced_accuracy(),
            class_metrics: metrics
                .iter()
                .map(|m| ClassEntry {
                    class: m.class.as_str(),
                    precision: m.precision,
                    recall: m.recall,
                    f1: m.f1,
                    support: m.support,
                })
                .collect(),
        };

        let json = serde_json::to_string_pretty(&artifact).map_err(|e| IoError::Json {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        debug!(path = %path.display(), "confusion summary written");
        Ok(())
    }

    /// Persist `forest` in byte form to [`model_path`](Self::model_path).
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::WriteFile`] | The model file cannot be created or flushed |
    /// | [`IoError::Forest`] | The forest is untrained or encoding fails |
    #[instrument(skip_all, fields(experiment = %self.experiment))]
    pub fn save_model(&self, forest: &RandomForest) -> Result<PathBuf, IoError> {
        let path = self.model_path();
        let file = fs::File::create(&path).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        forest.export_model_to(&mut writer)?;
        writer.flush().map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), n_trees = forest.n_trees(), "model saved");
        Ok(path)
    }
}

/// Read a forest previously written by [`ResultWriter::save_model`].
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | The model file cannot be opened |
/// | [`IoError::Forest`] | The bytes are not a valid model |
#[instrument(fields(path = %path.display()))]
pub fn load_model(path: &Path) -> Result<RandomForest, IoError> {
    let file = fs::File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut forest = RandomForest::new();
    forest.import_model_from(std::io::BufReader::new(file))?;
    info!(n_trees = forest.n_trees(), "model loaded");
    Ok(forest)
}

// ---------------------------------------------------------------------------
// Shadow structs for JSON serialization
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ConfusionArtifact<'a> {
    experiment: &'a str,
    n_rows: usize,
    labels: &'a [String],
    matrix: &'a [Vec<usize>],
    accuracy: f64,
    balanced_accuracy: f64,
    class_metrics: Vec<ClassEntry<'a>>,
}

#[derive(Serialize)]
struct ClassEntry<'a> {
    class: &'a str,
    precision: f64,
    recall: f64,
    f1: f64,
    support: usize,
}
