//! Line-oriented control commands for a running monitor.
//!
//! ```text
//! pause | resume | toggle | click <x> <y> | reset | status | quit
//! ```

use anyhow::{anyhow, bail, Result};
use std::str::FromStr;
use std::time::Instant;

use crate::session::CaptureSession;
use crate::zone::ZoneState;
use crate::Point;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Pause,
    Resume,
    Toggle,
    Click(Point),
    Reset,
    Status,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            bail!("empty command");
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "toggle" => Command::Toggle,
            "reset" => Command::Reset,
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            "click" => {
                let x = parse_coord(parts.next(), "x")?;
                let y = parse_coord(parts.next(), "y")?;
                Command::Click(Point::new(x, y))
            }
            other => bail!("unknown command '{}'", other),
        };
        if parts.next().is_some() {
            bail!("unexpected arguments after '{}'", verb);
        }
        Ok(command)
    }
}

fn parse_coord(value: Option<&str>, axis: &str) -> Result<f32> {
    let raw = value.ok_or_else(|| anyhow!("click needs <x> <y>"))?;
    let parsed: f32 = raw
        .parse()
        .map_err(|_| anyhow!("click {} must be a number, got '{}'", axis, raw))?;
    if !parsed.is_finite() {
        bail!("click {} must be finite", axis);
    }
    Ok(parsed)
}

/// Result of applying a command.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Continue,
    Zone(ZoneState),
    Status,
    Quit,
}

/// Apply `command` to the session.
pub fn apply(session: &mut CaptureSession, command: &Command, now: Instant) -> Outcome {
    match command {
        Command::Pause => {
            session.pause(now);
            Outcome::Continue
        }
        Command::Resume => {
            session.resume(now);
            Outcome::Continue
        }
        Command::Toggle => {
            session.toggle_pause(now);
            Outcome::Continue
        }
        Command::Click(point) => {
            if !session.is_paused() {
                log::info!("click ignored: pause the feed before drawing a red zone");
            }
            Outcome::Zone(session.click(*point))
        }
        Command::Reset => {
            session.reset_zone();
            Outcome::Zone(session.editor().state())
        }
        Command::Status => Outcome::Status,
        Command::Quit => Outcome::Quit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() -> Result<()> {
        assert_eq!("pause".parse::<Command>()?, Command::Pause);
        assert_eq!("  RESUME ".parse::<Command>()?, Command::Resume);
        assert_eq!(
            "click 10 20.5".parse::<Command>()?,
            Command::Click(Point::new(10.0, 20.5))
        );
        assert_eq!("exit".parse::<Command>()?, Command::Quit);
        Ok(())
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!("".parse::<Command>().is_err());
        assert!("click 10".parse::<Command>().is_err());
        assert!("click ten 20".parse::<Command>().is_err());
        assert!("click NaN 1".parse::<Command>().is_err());
        assert!("reset now".parse::<Command>().is_err());
        assert!("jump".parse::<Command>().is_err());
    }
}
