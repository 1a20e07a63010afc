//! Per-connection protocol engine (spec §4.3): reads text-framed
//! messages off one [`DuplexStream`], routes requests through a
//! [`Dispatcher`], and writes back responses and events with a single
//! monotonically increasing `seq`.
//!
//! Grounded on `src/dap/yadap/mod.rs`'s connection loop: read one
//! frame, dispatch, write the reply, repeat — generalized here to also
//! drain backend-originated events after every request (spec §4.9) and
//! to guarantee `initialized` is sent immediately after the
//! `initialize` response, never before and never batched with anything
//! else (spec §4.3).

use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::FramingError;
use crate::framing::{read_text_frame, write_text_frame};
use crate::message::{Event, Message};
use crate::transport::DuplexStream;

pub struct ProtocolEngine {
    stream: DuplexStream,
    dispatcher: Arc<Dispatcher>,
    seq: i64,
}

impl ProtocolEngine {
    pub fn new(stream: DuplexStream, dispatcher: Arc<Dispatcher>) -> Self {
        ProtocolEngine {
            stream,
            dispatcher,
            seq: 1,
        }
    }

    /// Runs until the client disconnects or sends `disconnect`/`terminate`.
    pub fn run(&mut self) -> Result<(), FramingError> {
        loop {
            let Some(value) = read_text_frame(self.stream.reader())? else {
                log::debug!("protocol engine: client closed the connection");
                return Ok(());
            };
            let message = Message::decode(value)?;
            let Message::Request(request) = message else {
                log::warn!("protocol engine: ignoring non-request message from client");
                continue;
            };

            let is_initialize = request.command == "initialize";
            let should_stop = matches!(request.command.as_str(), "disconnect" | "terminate");

            let response = self.dispatcher.dispatch(&request);
            self.send_response(request.seq, response)?;
            if is_initialize {
                self.send_event(Event::new("initialized", None))?;
            }
            for event in self.dispatcher.drain_client_events() {
                self.send_event(event)?;
            }
            if should_stop {
                return Ok(());
            }
        }
    }

    fn send_response(&mut self, request_seq: i64, response: crate::message::Response) -> Result<(), FramingError> {
        let seq = self.next_seq();
        write_text_frame(self.stream.writer(), &Message::Response(request_seq, response).encode(seq))
    }

    fn send_event(&mut self, event: Event) -> Result<(), FramingError> {
        let seq = self.next_seq();
        write_text_frame(self.stream.writer(), &Message::Event(seq, event).encode(seq))
    }

    fn next_seq(&mut self) -> i64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }
}
