//! PS/2 keyboard — scancode set 1
//!
//! Обработчик IRQ1 только будит main-задачу; скан-код из порта 0x60 читает
//! она сама и превращает его в `Message::KeyPush` через [`Keyboard`].
//! The IRQ1 handler only wakes the main task; the main task reads the
//! scancode from port 0x60 itself and turns it into `Message::KeyPush`
//! through [`Keyboard`].

use bitflags::bitflags;

use crate::ipc::Message;

/// Порт данных контроллера / Controller data port
#[cfg(target_os = "none")]
const KBD_DATA: u16 = 0x60;
/// Порт состояния контроллера / Controller status port
#[cfg(target_os = "none")]
const KBD_STATUS: u16 = 0x64;
#[cfg(target_os = "none")]
const STATUS_OUTPUT_FULL: u8 = 0x01;

/// Префикс расширенных кодов / Extended code prefix
const EXTENDED_PREFIX: u8 = 0xE0;
/// Бит отпускания клавиши / Key release bit
const RELEASE_BIT: u8 = 0x80;

const SC_LCTRL: u8 = 0x1D;
const SC_LSHIFT: u8 = 0x2A;
const SC_RSHIFT: u8 = 0x36;
const SC_LALT: u8 = 0x38;
const SC_CAPS_LOCK: u8 = 0x3A;
const SC_LGUI: u8 = 0x5B; // после 0xE0 / after 0xE0
const SC_RGUI: u8 = 0x5C; // после 0xE0 / after 0xE0

bitflags! {
    /// Модификаторы в раскладке HID / Modifiers in HID layout
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const LCTRL  = 1 << 0;
        const LSHIFT = 1 << 1;
        const LALT   = 1 << 2;
        const LGUI   = 1 << 3;
        const RCTRL  = 1 << 4;
        const RSHIFT = 1 << 5;
        const RALT   = 1 << 6;
        const RGUI   = 1 << 7;
    }
}

/// US QWERTY, make-коды 0x00..0x3A / make codes 0x00..0x3A (0 == no ASCII)
const ASCII_LOWER: [u8; 0x3A] = [
    0, 0x1B, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0, b'a', b's',
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
];

const ASCII_UPPER: [u8; 0x3A] = [
    0, 0x1B, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t',
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0, b'A', b'S',
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V',
    b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
];

/// Декодер скан-кодов с состоянием модификаторов.
/// Scancode decoder carrying modifier state.
#[derive(Debug, Default)]
pub struct Keyboard {
    modifiers: Modifiers,
    caps_lock: bool,
    extended: bool,
}

impl Keyboard {
    pub const fn new() -> Self {
        Self { modifiers: Modifiers::empty(), caps_lock: false, extended: false }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Один байт скан-кода. `None` для префикса 0xE0; иначе `KeyPush`, где
    /// `keycode` — make-код (расширенные — с битом 0x80).
    /// One scancode byte. `None` for the 0xE0 prefix; otherwise `KeyPush` where
    /// `keycode` is the make code (extended ones with bit 0x80 set).
    pub fn decode(&mut self, scancode: u8) -> Option<Message> {
        if scancode == EXTENDED_PREFIX {
            self.extended = true;
            return None;
        }
        let extended = core::mem::take(&mut self.extended);
        let press = scancode & RELEASE_BIT == 0;
        let code = scancode & !RELEASE_BIT;

        if let Some(bit) = modifier_bit(code, extended) {
            self.modifiers.set(bit, press);
        } else if code == SC_CAPS_LOCK && press && !extended {
            self.caps_lock = !self.caps_lock;
        }

        let ascii = if extended { 0 } else { self.ascii(code) };
        let keycode = if extended { code | RELEASE_BIT } else { code };
        Some(Message::KeyPush { modifier: self.modifiers.bits(), keycode, ascii, press })
    }

    fn ascii(&self, code: u8) -> u8 {
        let shift = self.modifiers.intersects(Modifiers::LSHIFT | Modifiers::RSHIFT);
        let Some(&lower) = ASCII_LOWER.get(code as usize) else {
            return 0;
        };
        let upper = ASCII_UPPER[code as usize];
        let upper_case = if lower.is_ascii_alphabetic() { shift ^ self.caps_lock } else { shift };
        if upper_case { upper } else { lower }
    }
}

fn modifier_bit(code: u8, extended: bool) -> Option<Modifiers> {
    let bit = match (code, extended) {
        (SC_LCTRL, false) => Modifiers::LCTRL,
        (SC_LCTRL, true) => Modifiers::RCTRL,
        (SC_LSHIFT, false) => Modifiers::LSHIFT,
        (SC_RSHIFT, false) => Modifiers::RSHIFT,
        (SC_LALT, false) => Modifiers::LALT,
        (SC_LALT, true) => Modifiers::RALT,
        (SC_LGUI, true) => Modifiers::LGUI,
        (SC_RGUI, true) => Modifiers::RGUI,
        _ => return None,
    };
    Some(bit)
}

/// Прочитать ожидающий скан-код, если он есть.
/// Read the pending scancode, if any.
#[cfg(target_os = "none")]
pub fn read_scancode() -> Option<u8> {
    use crate::arch::x86_64::cpu::inb;
    // SAFETY: порты PS/2-контроллера; чтение 0x60 снимает байт из буфера.
    // PS/2 controller ports; reading 0x60 consumes the buffered byte.
    unsafe {
        if inb(KBD_STATUS) & STATUS_OUTPUT_FULL == 0 {
            return None;
        }
        Some(inb(KBD_DATA))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(msg: Option<Message>) -> (u8, u8, u8, bool) {
        match msg {
            Some(Message::KeyPush { modifier, keycode, ascii, press }) => (modifier, keycode, ascii, press),
            other => panic!("expected a key event, got {:?}", other),
        }
    }

    #[test]
    fn plain_key_press_and_release() {
        let mut kbd = Keyboard::new();
        assert_eq!(key(kbd.decode(0x1E)), (0, 0x1E, b'a', true));
        assert_eq!(key(kbd.decode(0x9E)), (0, 0x1E, b'a', false));
    }

    #[test]
    fn shift_selects_upper_table() {
        let mut kbd = Keyboard::new();
        kbd.decode(SC_LSHIFT);
        assert_eq!(key(kbd.decode(0x02)), (Modifiers::LSHIFT.bits(), 0x02, b'!', true));
        kbd.decode(SC_LSHIFT | RELEASE_BIT);
        assert_eq!(kbd.modifiers(), Modifiers::empty());
        assert_eq!(key(kbd.decode(0x02)).2, b'1');
    }

    #[test]
    fn caps_lock_affects_letters_only() {
        let mut kbd = Keyboard::new();
        kbd.decode(SC_CAPS_LOCK);
        kbd.decode(SC_CAPS_LOCK | RELEASE_BIT);
        assert_eq!(key(kbd.decode(0x10)).2, b'Q');
        assert_eq!(key(kbd.decode(0x02)).2, b'1');
    }

    #[test]
    fn extended_prefix_marks_right_modifiers() {
        let mut kbd = Keyboard::new();
        assert!(kbd.decode(EXTENDED_PREFIX).is_none());
        let (modifier, keycode, ascii, press) = key(kbd.decode(SC_LCTRL));
        assert_eq!(modifier, Modifiers::RCTRL.bits());
        assert_eq!(keycode, SC_LCTRL | RELEASE_BIT);
        assert_eq!((ascii, press), (0, true));
        assert_eq!(key(kbd.decode(0x1E)).0, Modifiers::RCTRL.bits());
    }
}
