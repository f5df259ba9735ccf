//! spim: background fitting, integration and PCA for spectrum-image stacks.

use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use spectrum_imager::config::{
    AnalysisConfig, BackgroundConfig, IntegrationConfig, PcaConfig, WindowSpec,
};
use spectrum_imager::data::{synthesize, Roi, SpectrumStack, SynthParams};
use spectrum_imager::export;
use spectrum_imager::fit::FitModel;
use spectrum_imager::log::reproducibility::ReproLog;
use spectrum_imager::pipeline::runner;

#[derive(Parser)]
#[command(
    name = "spim",
    version,
    about = "Background fitting, integration and PCA for spectrum-image stacks"
)]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print geometry and calibration of a stack
    Info {
        /// Input stack file
        #[arg(short, long)]
        input: PathBuf,

        /// Write the mean spectrum as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Write a synthetic stack (power-law background plus an edge)
    Synth {
        /// Output stack file
        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, default_value_t = 32)]
        width: usize,

        #[arg(long, default_value_t = 32)]
        height: usize,

        #[arg(long, default_value_t = 256)]
        channels: usize,

        /// Background exponent r in E^-r
        #[arg(long, default_value_t = 3.0)]
        exponent: f64,

        /// Add Poisson counting noise
        #[arg(long, default_value_t = false)]
        noise: bool,

        #[arg(long, default_value_t = 7)]
        seed: u64,
    },

    /// Fit the background of every pixel and write the coefficient maps
    Fit {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        background: BackgroundArgs,

        /// Also export the ROI spectrum with its fit, as X,Y,W,H
        #[arg(long, value_parser = parse_roi)]
        roi: Option<Roi>,
    },

    /// Write the background-subtracted stack
    Subtract {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        background: BackgroundArgs,
    },

    /// Integrate the background-subtracted signal into a map
    Integrate {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        background: BackgroundArgs,

        /// Integration window START:END, both ends included
        #[arg(short, long)]
        window: Span,

        /// Sum (signal - fit)^2 / signal instead of the trapezoid integral
        #[arg(long, default_value_t = false)]
        hcm: bool,
    },

    /// Principal component analysis of an energy window
    Pca {
        #[command(flatten)]
        io: IoArgs,

        /// PCA window START:END (end exclusive for channels)
        #[arg(short, long)]
        window: Span,

        /// Subtract each pixel's mean before the decomposition
        #[arg(long, default_value_t = false)]
        mean_center: bool,

        /// Scale each pixel by 1/sqrt(total counts)
        #[arg(long, default_value_t = false)]
        weighted: bool,

        /// Remove this background model before the decomposition
        #[arg(long, requires = "fit")]
        model: Option<FitModel>,

        /// Background fit window START:END
        #[arg(long, requires = "model")]
        fit: Option<Span>,

        /// Number of component maps and spectra to export
        #[arg(short, long, default_value_t = 4)]
        components: usize,

        /// Write the stack reconstructed from the first N components
        #[arg(long)]
        filter: Option<usize>,
    },

    /// Execute an analysis configuration file
    Run {
        /// Input stack file
        #[arg(short, long)]
        input: PathBuf,

        /// Analysis configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory; defaults to the input's directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct IoArgs {
    /// Input stack file
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory; defaults to the input's directory
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Read windows as calibrated energies instead of channel indices
    #[arg(long, default_value_t = false)]
    energy: bool,

    /// Skip PNG previews of the maps
    #[arg(long, default_value_t = false)]
    no_png: bool,
}

#[derive(Args)]
struct BackgroundArgs {
    /// Background model: constant, linear, exponential, power or lcpl
    #[arg(short, long, default_value = "power")]
    model: FitModel,

    /// Background fit window START:END (end exclusive for channels)
    #[arg(short, long)]
    fit: Span,
}

/// `START:END` on the command line.
#[derive(Debug, Clone, Copy)]
struct Span(f64, f64);

impl FromStr for Span {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(':')
            .ok_or_else(|| format!("expected START:END, got '{}'", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("bad window bound '{}': {}", v, e))
        };
        Ok(Span(parse(a)?, parse(b)?))
    }
}

impl Span {
    fn to_window(self, energy: bool) -> Result<WindowSpec, String> {
        if energy {
            return Ok(WindowSpec::Energy([self.0, self.1]));
        }
        let index = |v: f64| {
            if v >= 0.0 && v.fract() == 0.0 {
                Ok(v as usize)
            } else {
                Err(format!("channel bound {} is not a non-negative integer (use --energy for energies)", v))
            }
        };
        Ok(WindowSpec::Channels([index(self.0)?, index(self.1)?]))
    }
}

fn parse_roi(s: &str) -> Result<Roi, String> {
    let parts: Vec<usize> = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("bad ROI '{}': {}", s, e))?;
    match parts[..] {
        [x, y, width, height] => Ok(Roi::new(x, y, width, height)),
        _ => Err(format!("expected X,Y,W,H, got '{}'", s)),
    }
}

impl BackgroundArgs {
    fn to_config(&self, energy: bool) -> Result<BackgroundConfig, String> {
        Ok(BackgroundConfig {
            model: self.model,
            fit: self.fit.to_window(energy)?,
        })
    }
}

fn default_out_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stack".to_string())
}

fn write_log(log: &ReproLog, dir: &Path, stem: &str) -> std::io::Result<()> {
    log.save_text(&dir.join(format!("{}_log.txt", stem)))?;
    log.save_json(&dir.join(format!("{}_log.json", stem)))?;
    log.save_script(&dir.join(format!("{}_replay.sh", stem)))?;
    Ok(())
}

/// Load the input, run `config` on it and write results plus the log.
fn execute(
    input: &Path,
    out_dir: Option<&Path>,
    mut config: AnalysisConfig,
    no_png: bool,
) -> Result<(), Box<dyn Error>> {
    let stack = SpectrumStack::load(input)?;
    if no_png {
        config.output.png = false;
    }
    let resolved = config.resolve(stack.axis(), stack.channels())?;

    let out_dir = out_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_out_dir(input));
    let stem = file_stem(input);
    let mut log = ReproLog::new();
    log.set_source(&input.display().to_string());
    log.describe_stack(&stack);

    let summary = runner::run(&stack, &resolved, &out_dir, &stem, &mut log)?;
    config.save(&out_dir.join(format!("{}_config.json", stem)))?;
    write_log(&log, &out_dir, &stem)?;

    for path in &summary.outputs {
        println!("{}", path.display());
    }
    Ok(())
}

fn info(input: &Path, csv: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let stack = SpectrumStack::load(input)?;
    let axis = stack.axis();
    let n = stack.channels();

    println!("File:      {}", input.display());
    println!(
        "Geometry:  {} x {} pixels, {} channels",
        stack.width(),
        stack.height(),
        n
    );
    println!(
        "Axis:      {} .. {} {} (step {})",
        axis.energy_at(0),
        axis.energy_at(n.saturating_sub(1)),
        axis.unit,
        axis.scale
    );

    let (lo, hi) = stack
        .data()
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    println!("Range:     {} .. {}", lo, hi);

    let mean = stack.mean_spectrum();
    if let Some((peak, value)) = mean
        .values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        println!(
            "Mean peak: channel {} ({} {}) = {}",
            peak,
            axis.energy_at(peak),
            axis.unit,
            value
        );
    }

    if let Some(path) = csv {
        std::fs::write(
            path,
            export::spectra_csv(&mean.axis, mean.len(), &[("mean", &mean.values[..])]),
        )?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    log::debug!("spim v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Info { input, csv } => info(&input, csv.as_deref()),

        Command::Synth {
            out,
            width,
            height,
            channels,
            exponent,
            noise,
            seed,
        } => {
            let params = SynthParams {
                width,
                height,
                channels,
                exponent,
                noise,
                seed,
                ..Default::default()
            };
            let stack = synthesize(&params)?;
            stack.save(&out)?;

            let mut log = ReproLog::new();
            log.set_source(&out.display().to_string());
            log.describe_stack(&stack);
            log.add_entry(
                "Synthesize",
                &format!(
                    "{}x{}x{} stack, exponent {}, noise {}, seed {}",
                    width, height, channels, exponent, noise, seed
                ),
                &format!(
                    "spim synth -o {} --width {} --height {} --channels {} --exponent {} --seed {}{}",
                    out.display(),
                    width,
                    height,
                    channels,
                    exponent,
                    seed,
                    if noise { " --noise" } else { "" }
                ),
            );
            write_log(&log, &default_out_dir(&out), &file_stem(&out))?;
            println!("{}", out.display());
            Ok(())
        }

        Command::Fit {
            io,
            background,
            roi,
        } => {
            let config = AnalysisConfig {
                background: Some(background.to_config(io.energy)?),
                roi,
                ..Default::default()
            };
            execute(&io.input, io.out_dir.as_deref(), config, io.no_png)
        }

        Command::Subtract { io, background } => {
            let config = AnalysisConfig {
                background: Some(background.to_config(io.energy)?),
                subtract: true,
                ..Default::default()
            };
            execute(&io.input, io.out_dir.as_deref(), config, io.no_png)
        }

        Command::Integrate {
            io,
            background,
            window,
            hcm,
        } => {
            let config = AnalysisConfig {
                background: Some(background.to_config(io.energy)?),
                integration: Some(IntegrationConfig {
                    window: window.to_window(io.energy)?,
                    hcm,
                }),
                ..Default::default()
            };
            execute(&io.input, io.out_dir.as_deref(), config, io.no_png)
        }

        Command::Pca {
            io,
            window,
            mean_center,
            weighted,
            model,
            fit,
            components,
            filter,
        } => {
            let background = match (model, fit) {
                (Some(model), Some(fit)) => Some(BackgroundConfig {
                    model,
                    fit: fit.to_window(io.energy)?,
                }),
                _ => None,
            };
            let config = AnalysisConfig {
                pca: Some(PcaConfig {
                    window: window.to_window(io.energy)?,
                    mean_center,
                    weighted,
                    subtract_background: background.is_some(),
                    components,
                    filter,
                }),
                background,
                ..Default::default()
            };
            execute(&io.input, io.out_dir.as_deref(), config, io.no_png)
        }

        Command::Run {
            input,
            config,
            out_dir,
        } => {
            let config = AnalysisConfig::load(&config)?;
            execute(&input, out_dir.as_deref(), config, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_parsing() {
        let s: Span = "10:40".parse().unwrap();
        assert_eq!(s.0, 10.0);
        assert_eq!(s.1, 40.0);
        assert!("10-40".parse::<Span>().is_err());
        assert!("a:4".parse::<Span>().is_err());
    }

    #[test]
    fn test_span_to_window() {
        let s = Span(10.0, 40.0);
        assert_eq!(s.to_window(false).unwrap(), WindowSpec::Channels([10, 40]));
        assert_eq!(s.to_window(true).unwrap(), WindowSpec::Energy([10.0, 40.0]));
        assert!(Span(10.5, 40.0).to_window(false).is_err());
    }

    #[test]
    fn test_roi_parsing() {
        assert_eq!(parse_roi("1,2,3,4").unwrap(), Roi::new(1, 2, 3, 4));
        assert!(parse_roi("1,2,3").is_err());
    }

    #[test]
    fn test_cli_parses_replayed_commands() {
        // Shape of the commands written into replay scripts.
        Cli::try_parse_from([
            "spim", "integrate", "-i", "a.spim", "--model", "power", "--fit", "20:91", "--window",
            "100:119", "--hcm",
        ])
        .unwrap();
        Cli::try_parse_from([
            "spim", "pca", "-i", "a.spim", "--window", "100:111", "--mean-center", "--weighted",
            "--model", "lcpl", "--fit", "20:91", "--filter", "2",
        ])
        .unwrap();
        assert!(Cli::try_parse_from(["spim", "pca", "-i", "a.spim", "--window", "1:5", "--model", "power"]).is_err());
    }
}
