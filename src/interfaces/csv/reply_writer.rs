use crate::domain::message::{Inbound, Reply};
use crate::error::Result;
use std::io::Write;

/// Marker written in the `state` column once a conversation has ended.
pub const ENDED: &str = "END";

/// Writes one CSV row per reply: who it went to, the routing state after it
/// and what the user would see. Buttons are written as their callback data,
/// separated by `|`.
pub struct ReplyWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReplyWriter<W> {
    pub fn new(sink: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(sink);
        writer.write_record(["user_id", "chat_id", "state", "suppressed", "text", "buttons"])?;
        Ok(Self { writer })
    }

    pub fn write_reply(&mut self, inbound: &Inbound, reply: &Reply) -> Result<()> {
        let state = reply
            .next_state
            .map(|s| s.name())
            .unwrap_or(ENDED);
        let buttons = reply
            .keyboard
            .iter()
            .map(|b| b.action.as_str())
            .collect::<Vec<_>>()
            .join("|");
        self.writer.write_record([
            inbound.user_id.to_string().as_str(),
            inbound.chat_id.to_string().as_str(),
            state,
            if reply.suppressed { "true" } else { "false" },
            reply.text.as_str(),
            buttons.as_str(),
        ])?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{Action, Button};
    use crate::domain::step::Step;

    #[test]
    fn test_writes_state_and_buttons() {
        let mut out = Vec::new();
        {
            let mut writer = ReplyWriter::new(&mut out).unwrap();
            let reply = Reply::at(Step::FromAddress2, "Street line 2?").with_keyboard(vec![
                Button::new("Skip", &Action::SkipFromAddress2),
                Button::new("Cancel", &Action::CancelOrder),
            ]);
            writer.write_reply(&Inbound::text(1, 10, "1 Main St"), &reply).unwrap();
            writer
                .write_reply(&Inbound::callback(1, 10, "confirm_cancel"), &Reply::ended("Bye"))
                .unwrap();
            writer.flush().unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "user_id,chat_id,state,suppressed,text,buttons");
        assert_eq!(
            lines[1],
            "1,10,FROM_ADDRESS2,false,Street line 2?,skip_from_address2|cancel_order"
        );
        assert_eq!(lines[2], "1,10,END,false,Bye,");
    }
}
