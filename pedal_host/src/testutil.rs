//! In-memory stream double for exercising the framing and RPC layers without
//! a socket.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

/// What a read should do once the scripted input is exhausted.
enum EndBehavior {
    /// `read` returns 0, like a closed socket.
    Eof,
    /// `read` fails with `TimedOut`, like a serial port with a read timeout.
    TimeOut,
}

pub struct ScriptedStream {
    chunks: VecDeque<Vec<u8>>,
    end: EndBehavior,
    written: Rc<RefCell<Vec<u8>>>,
}

impl ScriptedStream {
    /// One contiguous input script; EOF afterwards.
    pub fn new(input: Vec<u8>) -> (Self, Rc<RefCell<Vec<u8>>>) {
        Self::build(vec![input], EndBehavior::Eof)
    }

    /// Input delivered in the given chunks, one per `read` call; EOF
    /// afterwards.
    pub fn chunked(chunks: Vec<Vec<u8>>) -> (Self, Rc<RefCell<Vec<u8>>>) {
        Self::build(chunks, EndBehavior::Eof)
    }

    /// Like `new`, but reads past the script time out instead of closing.
    pub fn timing_out(input: Vec<u8>) -> (Self, Rc<RefCell<Vec<u8>>>) {
        Self::build(vec![input], EndBehavior::TimeOut)
    }

    fn build(chunks: Vec<Vec<u8>>, end: EndBehavior) -> (Self, Rc<RefCell<Vec<u8>>>) {
        let written = Rc::new(RefCell::new(Vec::new()));
        let stream = Self {
            chunks: chunks.into_iter().filter(|c| !c.is_empty()).collect(),
            end,
            written: Rc::clone(&written),
        };
        (stream, written)
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.chunks.front_mut() else {
            return match self.end {
                EndBehavior::Eof => Ok(0),
                EndBehavior::TimeOut => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
            };
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.chunks.pop_front();
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Splits captured writes into newline-delimited JSON values.
pub fn written_lines(written: &RefCell<Vec<u8>>) -> Vec<serde_json::Value> {
    written
        .borrow()
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).expect("written line is valid json"))
        .collect()
}
