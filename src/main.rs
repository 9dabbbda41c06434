use std::env::args;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use env_logger::Env;
use strum::IntoEnumIterator;

use rwlock_contention::{
    scenario::{
        runner::{Runner, RunnerConfig},
        Example, Scenario,
    },
    tracked_rwlock::TrackedRwLock,
};

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let options = Options::parse(args().skip(1))?;
    let scenario = match &options.source {
        Source::Example(example) => example.scenario(),
        Source::Script(path) => Scenario::from_file(path).map_err(|e| e.to_string())?,
    };

    // a fresh lock per run, handed to the runner explicitly
    let lock = TrackedRwLock::new();
    Runner::new(options.config)
        .run(&scenario, &lock)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

enum Source {
    Example(Example),
    Script(PathBuf),
}

struct Options {
    source: Source,
    config: RunnerConfig,
}

impl Options {
    /// `<example> | --script <file>`, plus `--auto` and `--settle-ms <n>`
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut source = None;
        let mut config = RunnerConfig::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--auto" => config.interactive = false,
                "--settle-ms" => {
                    let ms = args
                        .next()
                        .ok_or("--settle-ms needs a value")?
                        .parse::<u64>()
                        .map_err(|e| format!("bad --settle-ms: {e}"))?;
                    config.settle = Duration::from_millis(ms);
                }
                "--script" => {
                    let path = args.next().ok_or("--script needs a file")?;
                    source = Some(Source::Script(PathBuf::from(path)));
                }
                selector => {
                    let example = Example::from_str(selector)
                        .map_err(|_| format!("unknown example `{selector}', {}", usage()))?;
                    source = Some(Source::Example(example));
                }
            }
        }
        source
            .map(|source| Self { source, config })
            .ok_or_else(|| format!("no scenario supplied, {}", usage()))
    }
}

fn usage() -> String {
    format!(
        "use one of {} or --script <file>, optionally with --auto and --settle-ms <n>",
        Example::iter()
            .map(|e| e.to_string())
            .collect::<Vec<String>>()
            .join(",")
    )
}
