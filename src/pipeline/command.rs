//! 操作员指令 (文本控制台)

use std::str::FromStr;

use crate::error::{Result, SentinelError};
use crate::input::InputSource;

pub const USAGE: &str = "指令: threshold N | dwell N | disappear N | debounce S | \
worker ID | unworker ID | start SOURCE | stop | status | help | quit";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Threshold(i64),
    Dwell(i64),
    Disappear(i64),
    Debounce(f64),
    Worker(u64),
    Unworker(u64),
    Start(InputSource),
    Stop,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = SentinelError;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| SentinelError::rejected("command", line, "empty command"))?;
        let rest: Vec<&str> = parts.collect();
        let arg = rest.join(" ");

        let command = match name.to_ascii_lowercase().as_str() {
            "threshold" => Command::Threshold(parse_arg("threshold", &arg)?),
            "dwell" => Command::Dwell(parse_arg("dwell", &arg)?),
            "disappear" => Command::Disappear(parse_arg("disappear", &arg)?),
            "debounce" => Command::Debounce(parse_arg("debounce", &arg)?),
            "worker" => Command::Worker(parse_arg("worker", &arg)?),
            "unworker" => Command::Unworker(parse_arg("unworker", &arg)?),
            "start" => Command::Start(arg.parse()?),
            "stop" => Command::Stop,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => return Err(SentinelError::rejected("command", name, "unknown command")),
        };
        Ok(command)
    }
}

fn parse_arg<T: FromStr>(field: &'static str, arg: &str) -> Result<T> {
    if arg.is_empty() {
        return Err(SentinelError::rejected(field, arg, "missing value"));
    }
    arg.parse()
        .map_err(|_| SentinelError::rejected(field, arg, "not a number"))
}
