//! Key name table using Linux input event codes (`linux/input-event-codes.h`).
//!
//! The first entry for a code is its canonical name; later entries for the same
//! code are accepted aliases.  Lookups are case-insensitive.

/// `(name, code)` pairs.  Canonical names come first.
pub(super) static KEY_NAMES: &[(&str, u16)] = &[
    ("Esc", 1),
    ("Escape", 1),
    ("1", 2),
    ("2", 3),
    ("3", 4),
    ("4", 5),
    ("5", 6),
    ("6", 7),
    ("7", 8),
    ("8", 9),
    ("9", 10),
    ("0", 11),
    ("Minus", 12),
    ("Equal", 13),
    ("Backspace", 14),
    ("Tab", 15),
    ("Q", 16),
    ("W", 17),
    ("E", 18),
    ("R", 19),
    ("T", 20),
    ("Y", 21),
    ("U", 22),
    ("I", 23),
    ("O", 24),
    ("P", 25),
    ("LeftBrace", 26),
    ("BracketLeft", 26),
    ("RightBrace", 27),
    ("BracketRight", 27),
    ("Enter", 28),
    ("Return", 28),
    ("LeftCtrl", 29),
    ("Ctrl", 29),
    ("Control", 29),
    ("A", 30),
    ("S", 31),
    ("D", 32),
    ("F", 33),
    ("G", 34),
    ("H", 35),
    ("J", 36),
    ("K", 37),
    ("L", 38),
    ("Semicolon", 39),
    ("Apostrophe", 40),
    ("Grave", 41),
    ("LeftShift", 42),
    ("Shift", 42),
    ("Backslash", 43),
    ("Z", 44),
    ("X", 45),
    ("C", 46),
    ("V", 47),
    ("B", 48),
    ("N", 49),
    ("M", 50),
    ("Comma", 51),
    ("Dot", 52),
    ("Period", 52),
    ("Slash", 53),
    ("RightShift", 54),
    ("KpAsterisk", 55),
    ("LeftAlt", 56),
    ("Alt", 56),
    ("Space", 57),
    ("CapsLock", 58),
    ("Caps", 58),
    ("F1", 59),
    ("F2", 60),
    ("F3", 61),
    ("F4", 62),
    ("F5", 63),
    ("F6", 64),
    ("F7", 65),
    ("F8", 66),
    ("F9", 67),
    ("F10", 68),
    ("NumLock", 69),
    ("ScrollLock", 70),
    ("Kp7", 71),
    ("Kp8", 72),
    ("Kp9", 73),
    ("KpMinus", 74),
    ("Kp4", 75),
    ("Kp5", 76),
    ("Kp6", 77),
    ("KpPlus", 78),
    ("Kp1", 79),
    ("Kp2", 80),
    ("Kp3", 81),
    ("Kp0", 82),
    ("KpDot", 83),
    ("ZenkakuHankaku", 85),
    ("102nd", 86),
    ("F11", 87),
    ("F12", 88),
    ("Ro", 89),
    ("Katakana", 90),
    ("Hiragana", 91),
    ("Henkan", 92),
    ("KatakanaHiragana", 93),
    ("Muhenkan", 94),
    ("KpJpComma", 95),
    ("KpEnter", 96),
    ("RightCtrl", 97),
    ("KpSlash", 98),
    ("SysRq", 99),
    ("Print", 99),
    ("PrintScreen", 99),
    ("RightAlt", 100),
    ("AltGr", 100),
    ("LineFeed", 101),
    ("Home", 102),
    ("Up", 103),
    ("PageUp", 104),
    ("Left", 105),
    ("Right", 106),
    ("End", 107),
    ("Down", 108),
    ("PageDown", 109),
    ("Insert", 110),
    ("Delete", 111),
    ("Macro", 112),
    ("Mute", 113),
    ("VolumeDown", 114),
    ("VolumeUp", 115),
    ("Power", 116),
    ("KpEqual", 117),
    ("KpPlusMinus", 118),
    ("Pause", 119),
    ("Scale", 120),
    ("KpComma", 121),
    ("Hangeul", 122),
    ("Hanja", 123),
    ("Yen", 124),
    ("LeftMeta", 125),
    ("Super", 125),
    ("Meta", 125),
    ("Win", 125),
    ("RightMeta", 126),
    ("Compose", 127),
    ("Stop", 128),
    ("Again", 129),
    ("Props", 130),
    ("Undo", 131),
    ("Front", 132),
    ("Copy", 133),
    ("Open", 134),
    ("Paste", 135),
    ("Find", 136),
    ("Cut", 137),
    ("Help", 138),
    ("Menu", 139),
    ("Calc", 140),
    ("Setup", 141),
    ("Sleep", 142),
    ("WakeUp", 143),
    ("File", 144),
    ("SendFile", 145),
    ("DeleteFile", 146),
    ("Xfer", 147),
    ("Prog1", 148),
    ("Prog2", 149),
    ("Www", 150),
    ("MsDos", 151),
    ("ScreenLock", 152),
    ("RotateDisplay", 153),
    ("CycleWindows", 154),
    ("Mail", 155),
    ("Bookmarks", 156),
    ("Computer", 157),
    ("Back", 158),
    ("Forward", 159),
    ("CloseCd", 160),
    ("EjectCd", 161),
    ("EjectCloseCd", 162),
    ("NextSong", 163),
    ("PlayPause", 164),
    ("PreviousSong", 165),
    ("StopCd", 166),
    ("Record", 167),
    ("Rewind", 168),
    ("Phone", 169),
    ("Iso", 170),
    ("Config", 171),
    ("HomePage", 172),
    ("Refresh", 173),
    ("Exit", 174),
    ("Move", 175),
    ("Edit", 176),
    ("ScrollUp", 177),
    ("ScrollDown", 178),
    ("KpLeftParen", 179),
    ("KpRightParen", 180),
    ("New", 181),
    ("Redo", 182),
    ("F13", 183),
    ("F14", 184),
    ("F15", 185),
    ("F16", 186),
    ("F17", 187),
    ("F18", 188),
    ("F19", 189),
    ("F20", 190),
    ("F21", 191),
    ("F22", 192),
    ("F23", 193),
    ("F24", 194),
    ("PlayCd", 200),
    ("PauseCd", 201),
    ("Prog3", 202),
    ("Prog4", 203),
    ("Dashboard", 204),
    ("Suspend", 205),
    ("Close", 206),
    ("Play", 207),
    ("FastForward", 208),
    ("BassBoost", 209),
    ("PrintDoc", 210),
    ("Hp", 211),
    ("Camera", 212),
    ("Sound", 213),
    ("Question", 214),
    ("Email", 215),
    ("Chat", 216),
    ("Search", 217),
    ("Connect", 218),
    ("Finance", 219),
    ("Sport", 220),
    ("Shop", 221),
    ("AltErase", 222),
    ("Cancel", 223),
    ("BrightnessDown", 224),
    ("BrightnessUp", 225),
    ("Media", 226),
    ("SwitchVideoMode", 227),
    ("KbdIllumToggle", 228),
    ("KbdIllumDown", 229),
    ("KbdIllumUp", 230),
    ("Send", 231),
    ("Reply", 232),
    ("ForwardMail", 233),
    ("Save", 234),
    ("Documents", 235),
    ("Battery", 236),
    ("Bluetooth", 237),
    ("Wlan", 238),
    ("Uwb", 239),
    ("Unknown", 240),
    ("VideoNext", 241),
    ("VideoPrev", 242),
    ("BrightnessCycle", 243),
    ("BrightnessAuto", 244),
    ("DisplayOff", 245),
    ("Wwan", 246),
    ("RfKill", 247),
    ("MicMute", 248),
    ("BtnLeft", 272),
    ("MouseLeft", 272),
    ("BtnRight", 273),
    ("MouseRight", 273),
    ("BtnMiddle", 274),
    ("MouseMiddle", 274),
    ("BtnSide", 275),
    ("BtnExtra", 276),
    ("BtnForward", 277),
    ("BtnBack", 278),
    ("BtnTask", 279),
];
