//! Non-interactive "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::core::app::ChatApp;

/// Writes only the part of an accumulating message that has not been
/// written yet.
pub(crate) struct DeltaPrinter<W> {
    out: W,
    message_id: Option<String>,
    written: usize,
}

impl<W: Write> DeltaPrinter<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out,
            message_id: None,
            written: 0,
        }
    }

    pub(crate) fn print(&mut self, message_id: &str, text: &str) -> io::Result<()> {
        if self.message_id.as_deref() != Some(message_id) {
            self.message_id = Some(message_id.to_string());
            self.written = 0;
        }
        if let Some(fresh) = text.get(self.written..) {
            self.out.write_all(fresh.as_bytes())?;
            self.out.flush()?;
        }
        self.written = text.len();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

pub async fn run_say(app: &mut ChatApp, chat_id: &str, text: &str) -> Result<(), Box<dyn Error>> {
    app.select_chat(chat_id)?;

    let mut printer = DeltaPrinter::new(io::stdout());
    app.subscribe(move |message_id, text| {
        let _ = printer.print(message_id, text);
    });

    let result = app.send(text).await;
    println!();
    result?;
    Ok(())
}
