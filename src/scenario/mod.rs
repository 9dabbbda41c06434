//! # Scenarios
//! A scenario is a plain list of steps: somebody requests the lock, somebody releases it, or we just look.
//! The [runner] plays them against a [crate::tracked_rwlock::TrackedRwLock].
//!
//! Scenarios can be built in code, picked from the [Example]s or read from a text script:
//! ```text
//! # two readers and a writer
//! read read1
//! read read2
//! write write1
//! release read1
//! observe
//! ```

pub mod runner;

use std::{fmt, fs, path::Path, str::FromStr};

use strum_macros::{Display, EnumIter, EnumString};

use crate::{error::ScenarioError, tracked_rwlock::Mode};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// spawn the participant and let it ask for the lock
    Request { participant: String, mode: Mode },
    /// let the participant give the lock back
    Release { participant: String },
    /// just look at the lock
    Observe,
}

impl Step {
    /// what the prompt says before the step runs
    pub fn label(&self) -> String {
        match self {
            Step::Request { participant, .. } => format!("{participant} request lock"),
            Step::Release { participant } => format!("{participant} release"),
            Step::Observe => "observe".to_string(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Request { participant, mode } => write!(f, "{mode} {participant}"),
            Step::Release { participant } => write!(f, "release {participant}"),
            Step::Observe => write!(f, "observe"),
        }
    }
}

/// `read <name>`, `write <name>`, `release <name>` or `observe`
impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words = s.split_whitespace().collect::<Vec<_>>();
        match words.as_slice() {
            ["observe"] => Ok(Step::Observe),
            ["release", participant] => Ok(Step::Release {
                participant: participant.to_string(),
            }),
            [action, participant] => Mode::from_str(action)
                .map(|mode| Step::Request {
                    participant: participant.to_string(),
                    mode,
                })
                .map_err(|_| format!("unknown action `{action}'")),
            _ => Err(format!("can't make a step out of `{s}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn read(self, participant: &str) -> Self {
        self.request(participant, Mode::Shared)
    }

    pub fn write(self, participant: &str) -> Self {
        self.request(participant, Mode::Exclusive)
    }

    pub fn request(mut self, participant: &str, mode: Mode) -> Self {
        self.steps.push(Step::Request {
            participant: participant.to_string(),
            mode,
        });
        self
    }

    pub fn release(mut self, participant: &str) -> Self {
        self.steps.push(Step::Release {
            participant: participant.to_string(),
        });
        self
    }

    pub fn observe(mut self) -> Self {
        self.steps.push(Step::Observe);
        self
    }

    /// One step per line, blank lines and `#` comments are skipped
    pub fn parse(name: impl Into<String>, script: &str) -> Result<Self, ScenarioError> {
        let mut scenario = Self::new(name);
        for (i, line) in script.lines().enumerate() {
            let line = match line.split_once('#') {
                Some((before, _comment)) => before,
                None => line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let step = Step::from_str(line).map_err(|reason| ScenarioError::Parse {
                line: i + 1,
                reason,
            })?;
            scenario.steps.push(step);
        }
        Ok(scenario)
    }

    /// the file name becomes the scenario name
    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let script = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(name, &script)
    }
}

/// Built-in walkthroughs, each one adds a bit more contention
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Example {
    /// a single reader
    One,
    /// two readers share the lock
    Two,
    /// a writer waits for two readers
    Three,
    /// a reader arriving after a waiting writer queues behind it
    Four,
    /// readers and writers interleaved
    Five,
}

impl Example {
    pub fn scenario(&self) -> Scenario {
        let name = format!("example {self}");
        match self {
            Example::One => Scenario::new(name).read("read1").release("read1"),
            Example::Two => Scenario::new(name)
                .read("read1")
                .read("read2")
                .release("read1")
                .release("read2"),
            Example::Three => Scenario::new(name)
                .read("read1")
                .read("read2")
                .write("write1")
                .release("read1")
                .release("read2")
                .release("write1"),
            Example::Four => Scenario::new(name)
                .read("read1")
                .read("read2")
                .write("write1")
                .read("read3")
                .release("read1")
                .release("read2")
                .release("write1")
                .release("read3"),
            Example::Five => Scenario::new(name)
                .read("read1")
                .read("read2")
                .write("write1")
                .read("read3")
                .write("write2")
                .read("read4")
                .release("read1")
                .release("read2")
                .read("read5")
                .release("write1")
                .read("read6")
                .release("read3")
                .release("read4")
                .release("read5")
                .release("write2")
                .release("read6"),
        }
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_parse_script() {
        let script = "
            # two readers
            read read1
            read read2   # the second one
            write write1

            release read1
            observe
        ";
        let scenario = Scenario::parse("script", script).unwrap();
        let expected = Scenario::new("script")
            .read("read1")
            .read("read2")
            .write("write1")
            .release("read1")
            .observe();
        assert_eq!(scenario, expected);
    }

    #[test]
    fn test_parse_errors_point_at_the_line() {
        match Scenario::parse("bad", "read r1\n\nupgrade r1\n") {
            Err(ScenarioError::Parse { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("upgrade"), "{reason}");
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
        assert!(Scenario::parse("bad", "release").is_err());
        assert!(Scenario::parse("bad", "observe now").is_err());
    }

    #[test]
    fn test_step_display_parses_back() {
        for step in Example::Five.scenario().steps {
            assert_eq!(Step::from_str(&step.to_string()), Ok(step));
        }
    }

    #[test]
    fn test_labels() {
        let scenario = Scenario::new("labels").write("write1").release("write1").observe();
        let labels = scenario.steps.iter().map(Step::label).collect::<Vec<_>>();
        assert_eq!(labels, ["write1 request lock", "write1 release", "observe"]);
    }

    #[test]
    fn test_examples_release_everyone_they_request() {
        for example in Example::iter() {
            let steps = example.scenario().steps;
            let requested = steps
                .iter()
                .filter(|s| matches!(s, Step::Request { .. }))
                .count();
            let released = steps
                .iter()
                .filter(|s| matches!(s, Step::Release { .. }))
                .count();
            assert_eq!(requested, released, "{example}");
        }
        assert_eq!(Example::from_str("three").unwrap(), Example::Three);
        assert_eq!(Example::Four.scenario().name, "example four");
    }
}
