//! Human-oriented console lines.
//!
//! Task log lines carry a `run_id` field; the console shows its first eight
//! characters up front so interleaved runs stay readable:
//!
//! ```text
//! 14:02:07.311  INFO run=1f0c9a2e [1.Setup/Seq2] Executing task 'Run.Delay'
//! ```

use crate::logging::context::ExecutionContext;
use serde::Deserialize;
use std::fmt::{self, Write as _};
use std::io;
use std::str::FromStr;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{self as tracing_fmt, FmtContext};
use tracing_subscriber::registry::LookupSpan;

#[cfg(test)]
use std::sync::{Arc, Mutex};

const RUN_ID_PREFIX: usize = 8;

pub type ConsoleFmtLayer<S> =
    tracing_fmt::Layer<S, format::DefaultFields, RunLineFormat, BoxMakeWriter>;

/// Where console logs should be emitted.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleOutput {
    Stdout,
    #[default]
    Stderr,
    None,
}

impl FromStr for ConsoleOutput {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "stdout" => Ok(ConsoleOutput::Stdout),
            "stderr" => Ok(ConsoleOutput::Stderr),
            "none" => Ok(ConsoleOutput::None),
            _ => Err(format!(
                "invalid logging.console_output '{}'; supported values are stdout, stderr, none",
                value
            )),
        }
    }
}

/// Batch runs keep stdout for the run summary, so console logs there go to
/// stderr or nowhere.
pub fn select_console_output(
    context: ExecutionContext,
    configured: Option<ConsoleOutput>,
) -> ConsoleOutput {
    match (context, configured) {
        (ExecutionContext::LocalDev, configured) => configured.unwrap_or(ConsoleOutput::Stderr),
        (ExecutionContext::Batch, Some(ConsoleOutput::Stdout) | None) => ConsoleOutput::None,
        (ExecutionContext::Batch, Some(other)) => other,
    }
}

pub fn console_layer<S>(output: ConsoleOutput) -> ConsoleFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let writer = captured_writer().unwrap_or_else(|| match output {
        ConsoleOutput::Stdout => BoxMakeWriter::new(io::stdout),
        ConsoleOutput::Stderr => BoxMakeWriter::new(io::stderr),
        ConsoleOutput::None => BoxMakeWriter::new(io::sink),
    });
    layer_with_writer(writer)
}

fn layer_with_writer<S>(writer: BoxMakeWriter) -> ConsoleFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .event_format(RunLineFormat)
        .with_writer(writer)
}

/// `<time> <LEVEL> run=<id> <message> key=value...`
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLineFormat;

impl<S, N> FormatEvent<S, N> for RunLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = LineFields::default();
        event.record(&mut fields);

        write!(
            writer,
            "{} {:>5} ",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            event.metadata().level()
        )?;
        if let Some(run_id) = &fields.run_id {
            let short = run_id.get(..RUN_ID_PREFIX).unwrap_or(run_id);
            write!(writer, "run={} ", short)?;
        }
        writer.write_str(&fields.message)?;
        for (name, value) in &fields.extra {
            write!(writer, " {}={}", name, value)?;
        }
        writeln!(writer)
    }
}

#[derive(Default)]
struct LineFields {
    message: String,
    run_id: Option<String>,
    extra: Vec<(&'static str, String)>,
}

impl Visit for LineFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "run_id" => self.run_id = Some(value.to_string()),
            name => self.extra.push((name, value.to_string())),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => {
                self.message.clear();
                let _ = write!(self.message, "{:?}", value);
            }
            "run_id" => self.run_id = Some(format!("{:?}", value)),
            name => self.extra.push((name, format!("{:?}", value))),
        }
    }
}

#[cfg(test)]
static CAPTURE: Mutex<Option<Arc<Mutex<Vec<u8>>>>> = Mutex::new(None);

/// Route every console layer built afterwards into `buffer`.
#[cfg(test)]
pub fn set_test_output(buffer: Arc<Mutex<Vec<u8>>>) {
    CAPTURE.lock().unwrap().replace(buffer);
}

#[cfg(test)]
pub fn clear_test_output() {
    CAPTURE.lock().unwrap().take();
}

#[cfg(test)]
fn captured_writer() -> Option<BoxMakeWriter> {
    let buffer = CAPTURE.lock().unwrap().clone()?;
    Some(BoxMakeWriter::new(move || BufferWriter(buffer.clone())))
}

#[cfg(not(test))]
fn captured_writer() -> Option<BoxMakeWriter> {
    None
}

#[cfg(test)]
struct BufferWriter(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
