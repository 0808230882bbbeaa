// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::config::MAX_GRID_DIM;

const PLAY: &str = "play";
const STOP: &str = "stop";
const RELOAD: &str = "reload";
const VOLUME: &str = "volume";
const GRID: &str = "grid";
const STATUS: &str = "status";
const QUIT: &str = "quit";

/// A controller that drives the board from lines typed on stdin.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and forwards one command. Returns false once input is exhausted or the user quits.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command (<pad>, {} <pad>, {}, {}, {} <0-100>, {} <rows> <cols> [font] [padding], {}, {}): ",
            PLAY, STOP, RELOAD, VOLUME, GRID, STATUS, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            Self::send(events_tx, Event::Quit)?;
            return Ok(false);
        }

        match parse_command(&input) {
            Ok(Some(event)) => {
                let quit = event == Event::Quit;
                Self::send(events_tx, event)?;
                Ok(!quit)
            }
            Ok(None) => Ok(true),
            Err(e) => {
                warn!(input = input.trim(), err = e, "Unrecognized input");
                Ok(true)
            }
        }
    }

    fn send(events_tx: &Sender<Event>, event: Event) -> Result<(), io::Error> {
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}

/// Parses one line of input. Blank lines parse to nothing.
fn parse_command(input: &str) -> Result<Option<Event>, &'static str> {
    let input = input.trim().to_lowercase();
    let mut words = input.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let event = match (command, args.as_slice()) {
        (PLAY, [pad]) => Event::Trigger(parse_pad(pad)?),
        (STOP, []) => Event::Stop,
        (RELOAD, []) => Event::Reload,
        (STATUS, []) => Event::Status,
        (QUIT | "exit", []) => Event::Quit,
        (VOLUME, [percent]) => {
            let percent: f64 = percent.parse().map_err(|_| "volume must be a number")?;
            if !(0.0..=100.0).contains(&percent) {
                return Err("volume must be between 0 and 100");
            }
            Event::Volume(percent)
        }
        (GRID, [rows, cols, rest @ ..]) if rest.len() <= 2 => {
            let number = |value: &str| {
                value
                    .parse::<i32>()
                    .map_err(|_| "grid values must be whole numbers")
            };
            let dimension = |value: &str| -> Result<i32, &'static str> {
                match number(value)? {
                    n if (1..=MAX_GRID_DIM).contains(&n) => Ok(n),
                    _ => Err("rows and columns must be between 1 and 64"),
                }
            };
            Event::Grid {
                rows: dimension(*rows)?,
                cols: dimension(*cols)?,
                font_size: rest.first().map(|v| number(*v)).transpose()?,
                padding: rest.get(1).map(|v| number(*v)).transpose()?,
            }
        }
        (pad, []) if pad.chars().all(|c| c.is_ascii_digit()) => Event::Trigger(parse_pad(pad)?),
        _ => return Err("unknown command"),
    };
    Ok(Some(event))
}

/// Converts a 1-based pad number into a slot.
fn parse_pad(pad: &str) -> Result<usize, &'static str> {
    match pad.parse::<usize>() {
        Ok(pad) if pad >= 1 => Ok(pad - 1),
        _ => Err("pads are numbered from 1"),
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use super::*;

    fn get_event(input: &str) -> Result<(bool, Option<Event>), io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(input.as_bytes());
        let writer = BufWriter::new(Vec::new());
        let keep_going = Driver::monitor_io(&sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok((keep_going, receiver.blocking_recv()))
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!((true, Some(Event::Trigger(0))), get_event("1\n")?);
        assert_eq!((true, Some(Event::Trigger(11))), get_event("PLAY 12")?);
        assert_eq!((true, Some(Event::Stop)), get_event(STOP)?);
        assert_eq!((true, Some(Event::Reload)), get_event(RELOAD)?);
        assert_eq!((true, Some(Event::Status)), get_event(STATUS)?);
        assert_eq!((true, Some(Event::Volume(42.5))), get_event("volume 42.5")?);
        assert_eq!(
            (true, Some(Event::Grid { rows: 3, cols: 5, font_size: None, padding: None })),
            get_event("grid 3 5")?
        );
        assert_eq!(
            (true, Some(Event::Grid { rows: 2, cols: 2, font_size: Some(20), padding: Some(-1) })),
            get_event("grid 2 2 20 -1")?
        );
        assert_eq!(
            (true, Some(Event::Grid { rows: 64, cols: 1, font_size: None, padding: None })),
            get_event("grid 64 1")?
        );
        assert_eq!((false, Some(Event::Quit)), get_event(QUIT)?);
        Ok(())
    }

    #[test]
    fn test_end_of_input_quits() -> Result<(), io::Error> {
        assert_eq!((false, Some(Event::Quit)), get_event("")?);
        Ok(())
    }

    #[test]
    fn test_bad_input_is_ignored() -> Result<(), io::Error> {
        assert_eq!((true, None), get_event("\n")?);
        assert_eq!((true, None), get_event("0")?);
        assert_eq!((true, None), get_event("volume 101")?);
        assert_eq!((true, None), get_event("volume loud")?);
        assert_eq!((true, None), get_event("grid 2")?);
        assert_eq!((true, None), get_event("grid 2 2 1 1 1")?);
        assert_eq!((true, None), get_event("grid 50000 50000")?);
        assert_eq!((true, None), get_event("grid 0 4")?);
        assert_eq!((true, None), get_event("grid 4 65")?);
        assert_eq!((true, None), get_event("unrecognized")?);
        Ok(())
    }
}
