//! Terminal styling utilities
//!
//! Semantic colors for CLI output:
//! - Green/yellow/red for status
//! - Cyan for headers and technical terms
//! - Bold for important identifiers
//! - Dim for secondary information

use crossterm::style::Stylize;

/// Extension trait for consistent MASW styling
///
/// Use these methods instead of direct color calls so all commands share one palette.
///
/// # Examples
///
/// ```
/// use crossterm::style::Stylize;
/// use masw::style::MaswStyle;
///
/// println!("{}", "Section Header".header());
/// println!("{}", "Success message".success());
/// println!("{}", "/path/to/config".technical());
/// ```
pub trait MaswStyle: Stylize {
    /// Style for section headers (cyan bold)
    ///
    /// Use for section titles like "MONITORS:", "Playback Devices", etc.
    fn header(self) -> <<Self as Stylize>::Styled as Stylize>::Styled
    where
        Self: Sized,
        <Self as Stylize>::Styled: Stylize,
    {
        self.cyan().bold()
    }

    /// Style for success/active status (green)
    fn success(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.green()
    }

    /// Style for error/missing status (red)
    ///
    /// Use for problems: "not connected", "disabled", error messages, etc.
    fn error(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.red()
    }

    /// Style for warning/partial status (yellow)
    fn warning(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.yellow()
    }

    /// Style for technical terms and identifiers (cyan)
    ///
    /// Use for GDI device names, paths, counts, etc.
    fn technical(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.cyan()
    }
}

impl<T: Stylize> MaswStyle for T {}
