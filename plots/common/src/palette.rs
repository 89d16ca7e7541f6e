//! Paul Tol's colorblind-safe qualitative schemes
//! (<https://personal.sron.nl/~pault/>).

pub mod bright {
    pub const BLUE: &str = "#4477AA";
    pub const RED: &str = "#EE6677";
    pub const GREEN: &str = "#228833";
    pub const YELLOW: &str = "#CCBB44";
    pub const CYAN: &str = "#66CCEE";
    pub const PURPLE: &str = "#AA3377";
    pub const GREY: &str = "#BBBBBB";
}

pub mod light {
    pub const LIGHT_BLUE: &str = "#77AADD";
    pub const ORANGE: &str = "#EE8866";
    pub const LIGHT_YELLOW: &str = "#EEDD88";
    pub const PINK: &str = "#FFAABB";
    pub const LIGHT_CYAN: &str = "#99DDFF";
    pub const MINT: &str = "#44BB99";
    pub const PEAR: &str = "#BBCC33";
    pub const OLIVE: &str = "#AAAA00";
    pub const PALE_GREY: &str = "#DDDDDD";
}
