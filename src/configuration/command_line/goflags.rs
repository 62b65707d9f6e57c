use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;
use std::rc::Rc;

use anyhow::Result;

/// How a flag's default shows up in the usage text. Zero values are left
/// out, like Go's `flag.PrintDefaults` does.
pub trait FlagDefault {
    fn describe_default(&self) -> Option<String>;
}

impl FlagDefault for bool {
    fn describe_default(&self) -> Option<String> {
        if *self {
            Some("true".to_owned())
        } else {
            None
        }
    }
}

impl FlagDefault for u64 {
    fn describe_default(&self) -> Option<String> {
        if *self == 0 {
            None
        } else {
            Some(self.to_string())
        }
    }
}

impl FlagDefault for f64 {
    fn describe_default(&self) -> Option<String> {
        if *self == 0.0 {
            None
        } else {
            Some(self.to_string())
        }
    }
}

impl FlagDefault for String {
    fn describe_default(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.clone())
        }
    }
}

impl<T: FlagDefault> FlagDefault for Option<T> {
    fn describe_default(&self) -> Option<String> {
        self.as_ref().and_then(|v| v.describe_default())
    }
}

pub struct GoFlag {
    pub name: &'static str,
    pub desc: &'static str,
    pub default: Option<String>,
    pub is_boolean: bool,
    pub setter: Box<dyn Fn(&str) -> Result<()>>,
}

pub struct FlagValue<T> {
    r: Rc<RefCell<T>>,
}

impl<T: Clone> FlagValue<T> {
    fn new(r: Rc<RefCell<T>>) -> Self {
        Self { r }
    }

    pub fn get(&self) -> T {
        self.r.borrow().clone()
    }
}

/// The outcome of parsing the command line.
#[derive(Debug, PartialEq)]
pub enum ParseOutcome {
    /// Flags were applied; these are the remaining positional arguments.
    Positional(Vec<String>),
    /// `-h` or `-help` was given.
    HelpRequested,
}

pub struct GoFlagSet {
    flags: BTreeMap<&'static str, GoFlag>,
}

impl GoFlagSet {
    pub fn new() -> Self {
        GoFlagSet {
            flags: BTreeMap::new(),
        }
    }

    /// Parses flags until the first non-flag argument or a lone `--`,
    /// the same way Go's `flag` package does.
    pub fn parse_args(&self, mut args: impl Iterator<Item = String>) -> Result<ParseOutcome> {
        let mut parsed_flags = HashSet::new();
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            if arg == "--" {
                break;
            }

            if arg.len() < 2 || !arg.starts_with('-') {
                positional.push(arg);
                break;
            }

            // Trim dashes at the beginning
            let stripped = arg.strip_prefix("--").unwrap_or(&arg[1..]);

            // Get the name of the flag, and - if it has form '-name=value' - its value
            let (name, maybe_value) = match stripped.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (stripped, None),
            };

            if name == "h" || name == "help" {
                return Ok(ParseOutcome::HelpRequested);
            }

            // Ensure that the flag was not present
            anyhow::ensure!(
                parsed_flags.insert(name.to_owned()),
                "The flag {} was provided twice",
                name,
            );

            // Get the flag object
            let flag = self
                .flags
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown flag: {}", name))?;

            // If the flag was not of form '-name=value`, get the value from the next arg
            let value = match maybe_value {
                Some(value) => value.to_owned(),
                None if flag.is_boolean => "1".to_owned(),
                None => args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Value is missing for flag {}", name))?,
            };

            (flag.setter)(value.as_ref())
                .map_err(|err| anyhow::anyhow!("Invalid value {:?} for flag -{}: {}", value, name, err))?;
        }

        positional.extend(args);
        Ok(ParseOutcome::Positional(positional))
    }

    /// Describes every flag, one per line, sorted by name.
    pub fn usage(&self) -> String {
        let mut out = String::new();
        for flag in self.flags.values() {
            let _ = writeln!(out, "  -{}", flag.name);
            let _ = match &flag.default {
                Some(default) => writeln!(out, "        {} (default {})", flag.desc, default),
                None => writeln!(out, "        {}", flag.desc),
            };
        }
        out
    }

    pub fn bool_var(
        &mut self,
        name: &'static str,
        default: bool,
        desc: &'static str,
    ) -> FlagValue<bool> {
        self.add_flag(name, true, default, desc, move |s| match s {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err(anyhow::anyhow!("Invalid value for bool flag: {}", s)),
        })
    }

    pub fn u64_var(
        &mut self,
        name: &'static str,
        default: u64,
        desc: &'static str,
    ) -> FlagValue<u64> {
        self.add_flag(name, false, default, desc, |s| Ok(s.parse()?))
    }

    pub fn f64_var(
        &mut self,
        name: &'static str,
        default: f64,
        desc: &'static str,
    ) -> FlagValue<f64> {
        self.add_flag(name, false, default, desc, |s| Ok(s.parse()?))
    }

    pub fn var<T: Clone + FlagDefault + 'static>(
        &mut self,
        name: &'static str,
        default: T,
        desc: &'static str,
        converter: impl Fn(&str) -> Result<T> + 'static,
    ) -> FlagValue<T> {
        self.add_flag(name, false, default, desc, converter)
    }

    fn add_flag<T: Clone + FlagDefault + 'static>(
        &mut self,
        name: &'static str,
        is_boolean: bool,
        default: T,
        desc: &'static str,
        parser: impl Fn(&str) -> Result<T> + 'static,
    ) -> FlagValue<T> {
        let default_desc = default.describe_default();
        let target = Rc::new(RefCell::new(default));
        let target_for_parser = target.clone();
        self.flags.insert(
            name,
            GoFlag {
                name,
                desc,
                default: default_desc,
                is_boolean,
                setter: Box::new(move |s| {
                    target_for_parser.replace(parser(s)?);
                    Ok(())
                }),
            },
        );
        FlagValue::new(target)
    }
}
