use evdev::Key;

/// A synthetic key press, optionally chorded with Ctrl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub ctrl: bool,
}

impl KeyPress {
    pub const fn plain(key: Key) -> Self {
        KeyPress { key, ctrl: false }
    }

    pub const fn ctrl(key: Key) -> Self {
        KeyPress { key, ctrl: true }
    }
}

/// Handler invoked when a rule fires. The gateway maps each variant to a
/// method; rules carry a tag instead of a function pointer so the table
/// stays a plain static.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Rotary,
    OutsideKey,
    ToneKey,
    Screen,
    Speak,
    Immobilized,
    Phone,
    IkeSensor,
    Time,
    Date,
    CdPoll,
    CdInfoRequest,
    CdStop,
    CdPause,
    CdStart,
    CdDiskChange,
}

/// One entry of the dispatch table. `pattern` must match the frame as an
/// exact prefix. A matching rule applies every configured effect: key
/// emission (keyboard not blocked), shell command, handler.
pub struct EventRule {
    pub pattern: &'static [u8],
    pub tag: &'static str,
    pub key: Option<KeyPress>,
    pub command: Option<&'static str>,
    pub action: Option<Action>,
}

const fn rule(
    pattern: &'static [u8],
    tag: &'static str,
    key: Option<KeyPress>,
    action: Option<Action>,
) -> EventRule {
    EventRule {
        pattern,
        tag,
        key,
        command: None,
        action,
    }
}

/// The ordered dispatch table. Insertion order is priority: the first
/// matching rule fires and the rest are never evaluated.
pub static EVENTS: &[EventRule] = &[
    // Board monitor buttons.
    rule(b"\xF0\x05\xFF\x47\x00\x38", "info", Some(KeyPress::plain(Key::KEY_I)), None),
    rule(b"\xF0\x04\x3B\x48\x05\x82", "enter", Some(KeyPress::plain(Key::KEY_ENTER)), None),
    rule(b"\xF0\x05\xFF\x47\x00\x0F\x42", "sel", Some(KeyPress::plain(Key::KEY_TAB)), None),
    rule(b"\xF0\x04\x3B\x49", "rotary", None, Some(Action::Rotary)),
    rule(b"\xF0\x04\x68\x48\x40\x94", "FF", Some(KeyPress::ctrl(Key::KEY_RIGHT)), None),
    rule(b"\xF0\x04\x68\x48\x50\x84", "RR", Some(KeyPress::ctrl(Key::KEY_LEFT)), None),
    rule(b"\xF0\x04\x68\x48\x11\xC5", "1", Some(KeyPress::plain(Key::KEY_ESC)), None),
    rule(b"\xF0\x04\x68\x48\x01\xD5", "2", Some(KeyPress::plain(Key::KEY_SPACE)), None),
    rule(b"\xF0\x04\x68\x48\x12\xC6", "3", Some(KeyPress::plain(Key::KEY_Z)), None),
    rule(b"\xF0\x04\x68\x48\x02\xD6", "4", Some(KeyPress::plain(Key::KEY_X)), None),
    rule(b"\xF0\x04\x68\x48\x13\xC7", "5", Some(KeyPress::plain(Key::KEY_LEFT)), None),
    rule(b"\xF0\x04\x68\x48\x03\xD7", "6", Some(KeyPress::plain(Key::KEY_RIGHT)), None),
    // Track skip doubles as "make sure we are playing".
    rule(b"\xF0\x04\x68\x48\x10\xC4", "cd-prev", Some(KeyPress::plain(Key::KEY_COMMA)), Some(Action::CdStart)),
    rule(b"\xF0\x04\x68\x48\x00\xD4", "cd-next", Some(KeyPress::plain(Key::KEY_DOT)), Some(Action::CdStart)),
    // Steering wheel.
    rule(b"\x50\x04\x68\x3B\x08\x0F", "cd-prev", Some(KeyPress::plain(Key::KEY_COMMA)), Some(Action::CdStart)),
    rule(b"\x50\x04\x68\x3B\x01\x06", "cd-next", Some(KeyPress::plain(Key::KEY_DOT)), Some(Action::CdStart)),
    // Sensor reports, recognized and logged; values not decoded.
    rule(b"\x80\x06\xBF\x19", "coolant-temp", None, None),
    rule(b"\x80\x09\xFF\x24", "fuel-consumption", None, None),
    rule(b"\x80\x0A\xFF\x24", "outside-temp", None, None),
    rule(b"\x7F\x20\x3F\xA0", "battery-voltage", None, None),
    rule(b"\x7F\x03\x3F\xA1\xE2", "re-battery-voltage", None, None),
    rule(b"\x50\x04\xC8\x3B\x80\x27", "speak", None, Some(Action::Speak)),
    rule(b"\xF0\x04\xFF\x48\x08\x4B", "phone", None, Some(Action::Phone)),
    // Radio addressing the CD changer.
    rule(b"\x68\x03\x18\x01", "cd-poll", None, Some(Action::CdPoll)),
    rule(b"\x68\x05\x18\x38\x00", "cd-inforeq", None, Some(Action::CdInfoRequest)),
    rule(b"\x68\x05\x18\x38\x01", "cd-stop", None, Some(Action::CdStop)),
    rule(b"\x68\x05\x18\x38\x02", "cd-pause", None, Some(Action::CdPause)),
    rule(b"\x68\x05\x18\x38\x03", "cd-start", None, Some(Action::CdStart)),
    rule(b"\x68\x05\x18\x38\x06", "cd-diskchange", None, Some(Action::CdDiskChange)),
    // Leaving the CD changer screen.
    rule(b"\xF0\x04\xFF\x48\x34", "menu", None, Some(Action::OutsideKey)),
    rule(b"\xF0\x04\x68\x48\x04", "tone", None, Some(Action::ToneKey)),
    rule(b"\x68\x05\x3B\x46", "screen", None, Some(Action::Screen)),
    // IKE broadcasts.
    rule(b"\x80\x0C\xFF\x24\x01\x00", "time", None, Some(Action::Time)),
    rule(b"\x80\x0C\xE7\x24\x01\x00", "time", None, Some(Action::Time)),
    rule(b"\x80\x0F\xFF\x24\x02\x00", "date", None, Some(Action::Date)),
    rule(b"\x80\x0F\xE7\x24\x02\x00", "date", None, Some(Action::Date)),
    rule(b"\x80\x0A\xBF\x13", "ike-sensor", None, Some(Action::IkeSensor)),
    rule(b"\x44\x05\xBF\x74\x00\xFF", "immobilized", None, Some(Action::Immobilized)),
];

/// First rule whose pattern prefixes the frame.
pub fn match_rule(frame: &[u8]) -> Option<&'static EventRule> {
    match_rule_in(EVENTS, frame)
}

pub fn match_rule_in<'a>(table: &'a [EventRule], frame: &[u8]) -> Option<&'a EventRule> {
    table
        .iter()
        .find(|rule| frame.len() >= rule.pattern.len() && frame.starts_with(rule.pattern))
}

/// Radio disc/track-label broadcasts that mean the head unit has switched
/// to the CD-changer screen. Three shapes have been observed in the
/// field; they are matched byte-for-byte and deliberately not
/// generalized, since the label text is not otherwise documented.
pub fn cdc_screen_shape(frame: &[u8]) -> Option<&'static str> {
    if frame.len() == 20
        && frame[0] == 0x68
        && frame[6] == 0x43
        && frame[13] == 0x34
        && frame[19] == 0x4c
    {
        return Some("CDC 1-04");
    }

    if frame.len() >= 16
        && frame[0] == 0x68
        && frame[6] == 0x54
        && frame[7] == 0x52
        && frame[8] == 0x20
        && frame[9] == 0x30
        && frame[10] == 0x34
    {
        return Some("TR 04");
    }

    if frame.len() == 25
        && frame[0] == 0x68
        && frame[15] == 0x43
        && frame[16] == 0x44
        && frame[18] == 0x31
        && frame[20] == 0x30
        && frame[21] == 0x34
        && frame[24] == 0x25
    {
        return Some("CD 1-04");
    }

    None
}
