use crossterm::style::Color;

/// Color theme for the board and panels
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: &'static str,
    pub bg: Color,
    pub fg: Color,
    /// Thin cell separators
    pub border: Color,
    /// 3x3 box separators
    pub box_border: Color,
    /// Cells that belong to the puzzle
    pub given: Color,
    /// Values entered by the player
    pub filled: Color,
    /// Pencil notes and candidate overlay
    pub note: Color,
    pub selected_bg: Color,
    /// Same row, column or box as the cursor
    pub highlight_bg: Color,
    /// Cells pointed at by a hint
    pub hint_bg: Color,
    /// Cells flagged by validation
    pub conflict: Color,
    pub success: Color,
    pub info: Color,
    pub key: Color,
    pub menu_bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    /// Dark theme (default)
    pub fn dark() -> Self {
        Self {
            name: "Dark",
            bg: Color::Rgb { r: 20, g: 22, b: 30 },
            fg: Color::Rgb { r: 230, g: 230, b: 240 },
            border: Color::Rgb { r: 70, g: 75, b: 90 },
            box_border: Color::Rgb { r: 130, g: 140, b: 170 },
            given: Color::Rgb { r: 255, g: 255, b: 255 },
            filled: Color::Rgb { r: 80, g: 180, b: 255 },
            note: Color::Rgb { r: 140, g: 150, b: 180 },
            selected_bg: Color::Rgb { r: 70, g: 90, b: 140 },
            highlight_bg: Color::Rgb { r: 35, g: 40, b: 55 },
            hint_bg: Color::Rgb { r: 40, g: 90, b: 50 },
            conflict: Color::Rgb { r: 255, g: 90, b: 90 },
            success: Color::Rgb { r: 90, g: 255, b: 130 },
            info: Color::Rgb { r: 160, g: 165, b: 185 },
            key: Color::Rgb { r: 255, g: 210, b: 100 },
            menu_bg: Color::Rgb { r: 30, g: 30, b: 40 },
        }
    }

    /// Light theme for bright terminal backgrounds
    pub fn light() -> Self {
        Self {
            name: "Light",
            bg: Color::Rgb { r: 248, g: 248, b: 252 },
            fg: Color::Rgb { r: 30, g: 30, b: 40 },
            border: Color::Rgb { r: 180, g: 180, b: 195 },
            box_border: Color::Rgb { r: 60, g: 60, b: 80 },
            given: Color::Rgb { r: 0, g: 0, b: 0 },
            filled: Color::Rgb { r: 30, g: 100, b: 200 },
            note: Color::Rgb { r: 130, g: 130, b: 150 },
            selected_bg: Color::Rgb { r: 180, g: 200, b: 255 },
            highlight_bg: Color::Rgb { r: 230, g: 232, b: 242 },
            hint_bg: Color::Rgb { r: 200, g: 240, b: 200 },
            conflict: Color::Rgb { r: 220, g: 50, b: 50 },
            success: Color::Rgb { r: 40, g: 160, b: 60 },
            info: Color::Rgb { r: 90, g: 90, b: 110 },
            key: Color::Rgb { r: 200, g: 120, b: 20 },
            menu_bg: Color::Rgb { r: 225, g: 225, b: 235 },
        }
    }

    /// High contrast theme
    pub fn high_contrast() -> Self {
        Self {
            name: "High Contrast",
            bg: Color::Black,
            fg: Color::White,
            border: Color::Grey,
            box_border: Color::White,
            given: Color::Yellow,
            filled: Color::Cyan,
            note: Color::Rgb { r: 150, g: 150, b: 150 },
            selected_bg: Color::Blue,
            highlight_bg: Color::Rgb { r: 30, g: 30, b: 30 },
            hint_bg: Color::DarkGreen,
            conflict: Color::Red,
            success: Color::Green,
            info: Color::Grey,
            key: Color::Yellow,
            menu_bg: Color::DarkGrey,
        }
    }

    /// All themes in menu order
    pub fn all() -> [Theme; 3] {
        [Self::dark(), Self::light(), Self::high_contrast()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_names_are_distinct() {
        let names: Vec<&str> = Theme::all().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Dark", "Light", "High Contrast"]);
        assert_eq!(Theme::default(), Theme::dark());
    }
}
