pub mod pca;
pub mod processing;
pub mod runner;

#[cfg(test)]
mod tests {
    use super::runner;
    use crate::config::AnalysisConfig;
    use crate::data::{synthesize, SpectrumStack, SynthParams};
    use crate::log::reproducibility::ReproLog;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("spim-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn small_params() -> SynthParams {
        SynthParams {
            width: 12,
            height: 10,
            channels: 120,
            ..Default::default()
        }
    }

    #[test]
    fn test_stack_file_roundtrip() {
        let dir = scratch_dir("roundtrip");
        let stack = synthesize(&small_params()).unwrap();
        let path = dir.join("synth.spim");
        stack.save(&path).unwrap();
        let back = SpectrumStack::load(&path).unwrap();

        assert_eq!(back.axis(), stack.axis());
        assert_eq!((back.width(), back.height(), back.channels()), (12, 10, 120));
        for (a, b) in back.data().iter().zip(stack.data()) {
            // Stored as f32.
            assert!((a - b).abs() <= 1e-6 * b.abs().max(1.0));
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_run_recovers_edge_map() {
        let dir = scratch_dir("run");
        let params = small_params();
        let stack = synthesize(&params).unwrap();

        // Pre-edge background 260–295 eV, edge integrated 300–320 eV.
        let config: AnalysisConfig = serde_json::from_str(
            r#"{
                "background": { "model": "power", "fit": { "energy": [260.0, 295.0] } },
                "integration": { "window": { "energy": [300.0, 320.0] } },
                "subtract": true,
                "roi": { "x": 4, "y": 3, "width": 4, "height": 4 },
                "pca": { "window": { "energy": [300.0, 305.0] }, "subtract_background": true,
                         "components": 2, "filter": 1 }
            }"#,
        )
        .unwrap();
        let resolved = config.resolve(stack.axis(), stack.channels()).unwrap();

        let mut log = ReproLog::new();
        log.set_source("synth.spim");
        let summary = runner::run(&stack, &resolved, &dir, "synth", &mut log).unwrap();

        for name in [
            "synth_c0.spim",
            "synth_c1.png",
            "synth_sub.spim",
            "synth_int.spim",
            "synth_roi.csv",
            "synth_scree.csv",
            "synth_pc0.png",
            "synth_pca1.spim",
        ] {
            assert!(dir.join(name).exists(), "missing {}", name);
        }
        assert!(summary.outputs.len() >= 12);

        // Noise-free data: the fitted exponent equals the synthetic one.
        let c1 = SpectrumStack::load(&dir.join("synth_c1.spim")).unwrap();
        for &r in c1.data() {
            assert!((r + params.exponent).abs() < 1e-4, "exponent {}", r);
        }

        // Integrated edge is large in the disc and ~0 in the corner.
        let int = SpectrumStack::load(&dir.join("synth_int.spim")).unwrap();
        let centre = int.value(6, 5, 0);
        let corner = int.value(0, 0, 0);
        assert!(centre > 1000.0, "centre {}", centre);
        assert!(corner.abs() < 1e-2 * centre, "corner {}", corner);

        // Fit, subtract, integrate, fit + subtract for PCA, PCA, filter.
        assert_eq!(log.len(), 7);
        let script = log.to_shell_script();
        assert!(script.contains("spim integrate -i synth.spim --model power"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
