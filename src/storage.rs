//! Persisted artifact layout (§6), written only when a task's
//! `save_reports` flag is set — a byproduct sink, not part of the Task
//! Store's source of truth. Grounded on
//! `original_source/python-services/data-analyzer-service/storage_manager.py`'s
//! `StorageManager`, translated into the teacher's module layout.

pub mod artifacts {
    use std::path::{Path, PathBuf};

    use chrono::Utc;
    use serde_json::{json, Value};

    use crate::models::{BatchResult, DiagnosticReport, Mode};

    /// Root of the persisted artifact tree (§6: `outputs/`).
    pub fn default_output_dir() -> PathBuf {
        PathBuf::from("outputs")
    }

    fn datasets_dir(output_dir: &Path, task_id: &str) -> PathBuf {
        output_dir.join("datasets").join(task_id)
    }

    fn reports_dir(output_dir: &Path, task_id: &str) -> PathBuf {
        output_dir.join("reports").join(task_id)
    }

    /// Aggregate a task's batch-result history into the same statistics
    /// shape `storage_manager.py`'s summary renderer expects: per-stage
    /// counters rolled up under `optimization_stats`/`verification_stats`,
    /// plus input/output sizes and the PII-cleaned count.
    pub fn compute_statistics(input_size: usize, batches: &[BatchResult]) -> Value {
        let mut optimized_count = 0i64;
        let mut generated_count = 0i64;
        let mut high_quality_kept = 0i64;
        let mut passed = 0i64;
        let mut corrected = 0i64;
        let mut rejected = 0i64;
        let mut parse_failures = 0i64;
        let mut pii_cleaned_count = 0i64;
        let mut output_size = 0usize;

        for batch in batches {
            let count = |key: &str| batch.counters.get(key).and_then(Value::as_i64).unwrap_or(0);
            match batch.stage.as_str() {
                "optimize" => {
                    optimized_count += batch.records.len() as i64;
                    high_quality_kept = count("high_quality_kept").max(high_quality_kept);
                }
                "generate" => generated_count += batch.records.len() as i64,
                "verify" => {
                    passed += count("passed");
                    corrected += count("corrected");
                    rejected += count("rejected");
                    parse_failures += count("parse_failures");
                }
                "redact" => {
                    pii_cleaned_count += count("cleaned_count");
                    output_size = batch.records.len();
                }
                _ => {}
            }
        }

        let verify_total = passed + corrected + rejected;
        let rate = |n: i64| if verify_total > 0 { n as f64 / verify_total as f64 } else { 0.0 };

        json!({
            "input_size": input_size,
            "output_size": output_size,
            "pii_cleaned_count": pii_cleaned_count,
            "optimization_stats": {
                "optimized_count": optimized_count,
                "generated_count": generated_count,
                "high_quality_kept": high_quality_kept,
            },
            "verification_stats": {
                "total": verify_total,
                "passed": passed,
                "corrected": corrected,
                "rejected": rejected,
                "parse_failures": parse_failures,
                "pass_rate": rate(passed),
                "correction_rate": rate(corrected),
                "rejection_rate": rate(rejected),
            },
        })
    }

    /// Find the `diagnose` stage's stored report, if the pipeline was run
    /// with `save_reports` (only then does it embed the full report rather
    /// than relying on the stage's implicit pass-through).
    pub fn find_diagnostic_report(batches: &[BatchResult]) -> Option<DiagnosticReport> {
        batches
            .iter()
            .find(|b| b.stage == "diagnose")
            .and_then(|b| b.counters.get("report"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The final dataset: the `redact` stage's records, the pipeline's last
    /// stage (§4.4 Stage 4).
    pub fn find_final_dataset(batches: &[BatchResult]) -> Vec<Value> {
        batches
            .iter()
            .rev()
            .find(|b| b.stage == "redact")
            .map(|b| b.records.iter().cloned().map(crate::models::Record::into_value).collect())
            .unwrap_or_default()
    }

    /// Write `optimized_dataset.json` and `metadata.json` under
    /// `outputs/datasets/{task_id}/` (§6).
    pub fn save_optimized_dataset(
        output_dir: &Path,
        task_id: &str,
        dataset: &[Value],
        statistics: &Value,
        mode: Mode,
    ) -> anyhow::Result<PathBuf> {
        let dir = datasets_dir(output_dir, task_id);
        std::fs::create_dir_all(&dir)?;

        let dataset_file = dir.join("optimized_dataset.json");
        std::fs::write(&dataset_file, serde_json::to_vec_pretty(dataset)?)?;

        let mode_str = match mode {
            Mode::Auto => "auto",
            Mode::Guided => "guided",
        };
        let metadata = json!({
            "task_id": task_id,
            "timestamp": Utc::now().to_rfc3339(),
            "mode": mode_str,
            "dataset_size": dataset.len(),
            "statistics": statistics,
        });
        std::fs::write(dir.join("metadata.json"), serde_json::to_vec_pretty(&metadata)?)?;

        Ok(dataset_file)
    }

    /// Write `diagnostic_report.json`, `statistics.json` and a rendered
    /// `summary.md` under `outputs/reports/{task_id}/` (§6).
    pub fn save_analysis_report(
        output_dir: &Path,
        task_id: &str,
        report: &DiagnosticReport,
        statistics: &Value,
        mode: Mode,
    ) -> anyhow::Result<PathBuf> {
        let dir = reports_dir(output_dir, task_id);
        std::fs::create_dir_all(&dir)?;

        std::fs::write(dir.join("diagnostic_report.json"), serde_json::to_vec_pretty(report)?)?;
        std::fs::write(dir.join("statistics.json"), serde_json::to_vec_pretty(statistics)?)?;

        let summary = render_summary_markdown(task_id, report, statistics, mode);
        std::fs::write(dir.join("summary.md"), summary)?;

        Ok(dir)
    }

    /// Render a human-readable Markdown summary, grounded on
    /// `StorageManager._generate_summary_markdown`.
    pub fn render_summary_markdown(
        task_id: &str,
        report: &DiagnosticReport,
        statistics: &Value,
        mode: Mode,
    ) -> String {
        let opt = statistics.get("optimization_stats").cloned().unwrap_or(Value::Null);
        let ver = statistics.get("verification_stats").cloned().unwrap_or(Value::Null);
        let get_i = |v: &Value, k: &str| v.get(k).and_then(Value::as_i64).unwrap_or(0);
        let get_f = |v: &Value, k: &str| v.get(k).and_then(Value::as_f64).unwrap_or(0.0);

        let input_size = get_i(statistics, "input_size");
        let output_size = get_i(statistics, "output_size");
        let growth_pct = if input_size > 0 {
            (output_size - input_size) as f64 / input_size as f64 * 100.0
        } else {
            0.0
        };

        let mode_str = match mode {
            Mode::Auto => "auto (automatic annotation-pipeline optimization)",
            Mode::Guided => "guided (user-specified optimization)",
        };
        let data_kind = if report.has_think_field {
            "reasoning data (has a `think` field)"
        } else {
            "plain QA data"
        };
        let reasoning_step = |label: &str| {
            if report.has_think_field {
                format!("- **{label}**: executed")
            } else {
                format!("- **{label}**: skipped (no `think` field)")
            }
        };

        format!(
            "# Data Optimization Report\n\n\
             ## Overview\n\n\
             - **Task ID**: {task_id}\n\
             - **Generated**: {timestamp}\n\
             - **Mode**: {mode_str}\n\
             - **Data type**: {data_kind}\n\n\
             ## Dataset Statistics\n\n\
             ### Input/Output\n\
             - **Input samples**: {input_size}\n\
             - **Output samples**: {output_size}\n\
             - **Growth**: {growth_pct:.1}%\n\n\
             ### Diagnosis\n\
             - **Sparse clusters**: {sparse_clusters}\n\
             - **Low-quality samples**: {low_quality}\n\
             {reasoning_analysis}\n\n\
             ### Optimization\n\
             - **Optimized samples**: {optimized_count}\n\
             - **Generated samples**: {generated_count}\n\
             - **High-quality samples kept**: {high_quality_kept}\n\
             {cot_rewrite}\n\n\
             ### RAG Verification\n\
             - **Total**: {verify_total}\n\
             - **Passed**: {passed} ({pass_rate:.1}%)\n\
             - **Corrected**: {corrected} ({correction_rate:.1}%)\n\
             - **Rejected**: {rejected} ({rejection_rate:.1}%)\n\n\
             ### PII Redaction\n\
             - **Records cleaned**: {pii_cleaned}\n\n\
             ## Pipeline Stages\n\n\
             1. Diagnose — identify sparse clusters and low-quality samples\n\
             2. Optimize/Generate — rewrite low-quality samples, generate for sparse clusters\n\
             3. Verify — RAG-backed factual verification, self-correction\n\
             4. Redact — PII scrub pass\n\n\
             ## File Locations\n\n\
             - Optimized dataset: `outputs/datasets/{task_id}/optimized_dataset.json`\n\
             - Metadata: `outputs/datasets/{task_id}/metadata.json`\n\
             - Diagnostic report: `outputs/reports/{task_id}/diagnostic_report.json`\n\
             - Statistics: `outputs/reports/{task_id}/statistics.json`\n",
            task_id = task_id,
            timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S"),
            mode_str = mode_str,
            data_kind = data_kind,
            input_size = input_size,
            output_size = output_size,
            growth_pct = growth_pct,
            sparse_clusters = report.sparse_clusters.len(),
            low_quality = report.low_quality_samples.len(),
            reasoning_analysis = reasoning_step("Reasoning-quality analysis"),
            optimized_count = get_i(&opt, "optimized_count"),
            generated_count = get_i(&opt, "generated_count"),
            high_quality_kept = get_i(&opt, "high_quality_kept"),
            cot_rewrite = reasoning_step("Chain-of-thought rewrite"),
            verify_total = get_i(&ver, "total"),
            passed = get_i(&ver, "passed"),
            pass_rate = get_f(&ver, "pass_rate") * 100.0,
            corrected = get_i(&ver, "corrected"),
            correction_rate = get_f(&ver, "correction_rate") * 100.0,
            rejected = get_i(&ver, "rejected"),
            rejection_rate = get_f(&ver, "rejection_rate") * 100.0,
            pii_cleaned = get_i(statistics, "pii_cleaned_count"),
        )
    }

    /// Persist both the dataset and the analysis report for a completed
    /// task under `output_dir`, in one call (the worker's `save_reports`
    /// entrypoint).
    pub fn save_task_artifacts(
        output_dir: &Path,
        task_id: &str,
        input_size: usize,
        mode: Mode,
        batches: &[BatchResult],
    ) -> anyhow::Result<()> {
        let statistics = compute_statistics(input_size, batches);
        let dataset = find_final_dataset(batches);
        let report = find_diagnostic_report(batches).unwrap_or_else(|| DiagnosticReport::empty(false));

        save_optimized_dataset(output_dir, task_id, &dataset, &statistics, mode)?;
        save_analysis_report(output_dir, task_id, &report, &statistics, mode)?;
        Ok(())
    }

}
