use super::{Caption, CaptionPacket};

/// Index of the last row of the 15 row caption grid
const BOTTOM_ROW: usize = 14;

const PADDING: u16 = 0x0000;

/// Maps a CEA-608 character code onto its Unicode code point.
///
/// Basic characters are single byte codes, special characters are
/// `0x0130..=0x013f` and extended characters `0x0220..=0x033f`, with the
/// channel bits of the first byte masked off.
fn translate(code: u16) -> char {
    let mapped: u32 = match code {
        0x2a => 0xe1,
        0x5c => 0xe9,
        0x5e => 0xed,
        0x5f => 0xf3,
        0x60 => 0xfa,
        0x7b => 0xe7,
        0x7c => 0xf7,
        0x7d => 0xd1,
        0x7e => 0xf1,
        0x7f => 0x2588,
        0x0130 => 0xae,
        0x0131 => 0xb0,
        0x0132 => 0xbd,
        0x0133 => 0xbf,
        0x0134 => 0x2122,
        0x0135 => 0xa2,
        0x0136 => 0xa3,
        0x0137 => 0x266a,
        0x0138 => 0xe0,
        0x0139 => 0xa0,
        0x013a => 0xe8,
        0x013b => 0xe2,
        0x013c => 0xea,
        0x013d => 0xee,
        0x013e => 0xf4,
        0x013f => 0xfb,
        0x0220 => 0xc1,
        0x0221 => 0xc9,
        0x0222 => 0xd3,
        0x0223 => 0xda,
        0x0224 => 0xdc,
        0x0225 => 0xfc,
        0x0226 => 0x2018,
        0x0227 => 0xa1,
        0x0228 => 0x2a,
        0x0229 => 0x27,
        0x022a => 0x2014,
        0x022b => 0xa9,
        0x022c => 0x2120,
        0x022d => 0x2022,
        0x022e => 0x201c,
        0x022f => 0x201d,
        0x0230 => 0xc0,
        0x0231 => 0xc2,
        0x0232 => 0xc7,
        0x0233 => 0xc8,
        0x0234 => 0xca,
        0x0235 => 0xcb,
        0x0236 => 0xeb,
        0x0237 => 0xce,
        0x0238 => 0xcf,
        0x0239 => 0xef,
        0x023a => 0xd4,
        0x023b => 0xd9,
        0x023c => 0xf9,
        0x023d => 0xdb,
        0x023e => 0xab,
        0x023f => 0xbb,
        0x0320 => 0xc3,
        0x0321 => 0xe3,
        0x0322 => 0xcd,
        0x0323 => 0xcc,
        0x0324 => 0xec,
        0x0325 => 0xd2,
        0x0326 => 0xf2,
        0x0327 => 0xd5,
        0x0328 => 0xf5,
        0x0329 => 0x7b,
        0x032a => 0x7d,
        0x032b => 0x5c,
        0x032c => 0x5e,
        0x032d => 0x5f,
        0x032e => 0x7c,
        0x032f => 0x7e,
        0x0330 => 0xc4,
        0x0331 => 0xe4,
        0x0332 => 0xd6,
        0x0333 => 0xf6,
        0x0334 => 0xdf,
        0x0335 => 0xa5,
        0x0336 => 0xa4,
        0x0337 => 0x2502,
        0x0338 => 0xc5,
        0x0339 => 0xe5,
        0x033a => 0xd8,
        0x033b => 0xf8,
        0x033c => 0x250c,
        0x033d => 0x2510,
        0x033e => 0x2514,
        0x033f => 0x2518,
        other => u32::from(other),
    };
    char::from_u32(mapped).unwrap_or(char::REPLACEMENT_CHARACTER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    PopOn,
    RollUp,
    PaintOn,
}

/// Command codes of one field/data channel pair.
///
/// Field 2 control codes are the field 1 value with the low bit of the first
/// byte set; data channel 2 moves every first byte up by 8.
#[derive(Debug, Clone, Copy)]
struct Codes {
    base: u8,
    ext: u8,
    resume_caption_loading: u16,
    end_of_caption: u16,
    roll_up_2_rows: u16,
    roll_up_3_rows: u16,
    roll_up_4_rows: u16,
    carriage_return: u16,
    resume_direct_captioning: u16,
    backspace: u16,
    erase_displayed_memory: u16,
    erase_non_displayed_memory: u16,
}

impl Codes {
    fn new(field: u8, data_channel: u8) -> Self {
        let (base, ext, control) = if data_channel == 0 {
            (0x10, 0x11, u16::from(0x14 | field) << 8)
        } else {
            (0x18, 0x19, u16::from(0x1c | field) << 8)
        };
        Codes {
            base,
            ext,
            resume_caption_loading: control | 0x20,
            end_of_caption: control | 0x2f,
            roll_up_2_rows: control | 0x25,
            roll_up_3_rows: control | 0x26,
            roll_up_4_rows: control | 0x27,
            carriage_return: control | 0x2d,
            resume_direct_captioning: control | 0x29,
            backspace: control | 0x21,
            erase_displayed_memory: control | 0x2c,
            erase_non_displayed_memory: control | 0x2e,
        }
    }

    fn is_special_character(&self, char0: u8, char1: u8) -> bool {
        char0 == self.ext && (0x30..=0x3f).contains(&char1)
    }

    fn is_ext_character(&self, char0: u8, char1: u8) -> bool {
        (char0 == self.ext + 1 || char0 == self.ext + 2) && (0x20..=0x3f).contains(&char1)
    }

    fn is_mid_row_code(&self, char0: u8, char1: u8) -> bool {
        char0 == self.ext && (0x20..=0x2f).contains(&char1)
    }

    fn is_pac(&self, char0: u8, char1: u8) -> bool {
        char0 >= self.base && char0 < self.base + 8 && (0x40..=0x7f).contains(&char1)
    }
}

fn is_normal_char(c: u8) -> bool {
    (0x20..=0x7f).contains(&c)
}

fn blank_buffer() -> Vec<String> {
    vec![String::new(); BOTTOM_ROW + 1]
}

/// CEA-608 decoder for one caption channel (CC1..CC4).
///
/// Text is written into a 15 row grid. Pop-on captions are composed in
/// non-displayed memory and swapped in by EOC; roll-up and paint-on captions
/// write straight into displayed memory. A cue is emitted whenever displayed
/// memory is replaced, with the pts of the command that replaced it.
#[derive(Debug)]
pub struct Cea608Stream {
    name: String,
    codes: Codes,
    mode: Mode,
    displayed: Vec<String>,
    non_displayed: Vec<String>,
    start_pts: i64,
    last_control_code: Option<u16>,
    row: usize,
    top_row: usize,
    roll_up_rows: usize,
}

impl Cea608Stream {
    /// Decoder for `field` (0 or 1) and `data_channel` (0 or 1)
    pub fn new(field: u8, data_channel: u8) -> Self {
        let field = field & 1;
        let data_channel = data_channel & 1;
        Self {
            name: format!("CC{}", ((field << 1) | data_channel) + 1),
            codes: Codes::new(field, data_channel),
            mode: Mode::PopOn,
            displayed: blank_buffer(),
            non_displayed: blank_buffer(),
            start_pts: 0,
            last_control_code: None,
            row: BOTTOM_ROW,
            top_row: 0,
            roll_up_rows: 2,
        }
    }

    /// Channel name, `CC1` to `CC4`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decodes one byte pair, pushing any cue it completes
    pub fn push(&mut self, packet: &CaptionPacket, out: &mut Vec<Caption>) {
        // strip parity
        let data = packet.cc_data & 0x7f7f;
        let pts = packet.pts;

        // control codes are transmitted twice
        if Some(data) == self.last_control_code {
            self.last_control_code = None;
            return;
        }
        if data & 0xf000 == 0x1000 {
            self.last_control_code = Some(data);
        } else if data != PADDING {
            self.last_control_code = None;
        }

        let char0 = (data >> 8) as u8;
        let char1 = (data & 0xff) as u8;
        let codes = self.codes;

        if data == PADDING {
            return;
        }

        if data == codes.resume_caption_loading {
            self.mode = Mode::PopOn;
        } else if data == codes.end_of_caption {
            // paint-on text is swapped out like a pop-on caption
            self.mode = Mode::PopOn;
            self.flush_displayed(pts, out);
            std::mem::swap(&mut self.displayed, &mut self.non_displayed);
            self.start_pts = pts;
        } else if data == codes.roll_up_2_rows {
            self.roll_up_rows = 2;
            self.set_roll_up(pts, out);
        } else if data == codes.roll_up_3_rows {
            self.roll_up_rows = 3;
            self.set_roll_up(pts, out);
        } else if data == codes.roll_up_4_rows {
            self.roll_up_rows = 4;
            self.set_roll_up(pts, out);
        } else if data == codes.carriage_return {
            self.flush_displayed(pts, out);
            self.shift_rows_up();
            self.start_pts = pts;
        } else if data == codes.backspace {
            self.active_row().pop();
        } else if data == codes.erase_displayed_memory {
            self.flush_displayed(pts, out);
            self.displayed = blank_buffer();
        } else if data == codes.erase_non_displayed_memory {
            self.non_displayed = blank_buffer();
        } else if data == codes.resume_direct_captioning {
            if self.mode != Mode::PaintOn {
                self.flush_displayed(pts, out);
                self.displayed = blank_buffer();
            }
            self.mode = Mode::PaintOn;
            self.start_pts = pts;
        } else if codes.is_special_character(char0, char1) {
            let code = (u16::from(char0 & 0x03) << 8) | u16::from(char1);
            self.active_row().push(translate(code));
        } else if codes.is_ext_character(char0, char1) {
            // replaces the basic character sent ahead of it
            let row = self.active_row();
            row.pop();
            let code = (u16::from(char0 & 0x03) << 8) | u16::from(char1);
            row.push(translate(code));
        } else if codes.is_mid_row_code(char0, char1) {
            self.active_row().push(' ');
        } else if codes.is_pac(char0, char1) {
            self.active_row().push_str("  ");
        } else if is_normal_char(char0) {
            let row = self.active_row();
            row.push(translate(u16::from(char0)));
            if char1 != 0x00 {
                row.push(translate(u16::from(char1)));
            }
        } else {
            log::trace!("{}: ignoring cc data {:#06x}", self.name, data);
        }
    }

    /// Drops all memory and returns to pop-on mode
    pub fn reset(&mut self) {
        self.mode = Mode::PopOn;
        self.displayed = blank_buffer();
        self.non_displayed = blank_buffer();
        self.start_pts = 0;
        self.last_control_code = None;
        self.row = BOTTOM_ROW;
        self.top_row = 0;
        self.roll_up_rows = 2;
    }

    fn active_row(&mut self) -> &mut String {
        match self.mode {
            Mode::PopOn => &mut self.non_displayed[self.row],
            Mode::RollUp | Mode::PaintOn => &mut self.displayed[self.row],
        }
    }

    fn flush_displayed(&mut self, pts: i64, out: &mut Vec<Caption>) {
        let rows: Vec<&str> = self.displayed.iter().map(|row| row.trim()).collect();
        let text = rows.join("\n");
        let text = text.trim_matches('\n');
        if !text.is_empty() {
            out.push(Caption {
                start_pts: self.start_pts,
                end_pts: pts,
                text: text.to_string(),
                stream: self.name.clone(),
                start_time: None,
                end_time: None,
            });
        }
    }

    fn set_roll_up(&mut self, pts: i64, out: &mut Vec<Caption>) {
        if self.mode != Mode::RollUp {
            self.row = BOTTOM_ROW;
            self.mode = Mode::RollUp;
            // switching into roll-up wipes both memories
            self.flush_displayed(pts, out);
            self.non_displayed = blank_buffer();
            self.displayed = blank_buffer();
        }
        self.top_row = (self.row + 1).saturating_sub(self.roll_up_rows);
    }

    fn shift_rows_up(&mut self) {
        for row in &mut self.displayed[..self.top_row] {
            row.clear();
        }
        for row in &mut self.displayed[self.row + 1..] {
            row.clear();
        }
        for i in self.top_row..self.row {
            self.displayed[i] = std::mem::take(&mut self.displayed[i + 1]);
        }
        self.displayed[self.row].clear();
    }
}
