use ratatui::style::Color;

pub const ACCENT: Color = Color::Rgb(0, 160, 50);
pub const CLOCK: Color = Color::Rgb(180, 160, 60);
pub const INFO: Color = Color::Rgb(0, 150, 160);
pub const COUNT: Color = Color::Rgb(160, 60, 160);
pub const ERROR: Color = Color::Rgb(180, 60, 60);
pub const BACKGROUND: Color = Color::Rgb(15, 15, 25);
pub const BORDER: Color = Color::Rgb(30, 130, 30);
pub const LINK: Color = Color::Rgb(60, 130, 180);
pub const SELECTED_BG: Color = Color::Rgb(25, 40, 30);
pub const MUTED: Color = Color::DarkGray;

/// Utilization thresholds: above 90% hot, above 50% busy.
pub fn utilization_color(percent: f64) -> Color {
    if percent > 90.0 {
        ERROR
    } else if percent > 50.0 {
        CLOCK
    } else {
        ACCENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization_color() {
        assert_eq!(utilization_color(10.0), ACCENT);
        assert_eq!(utilization_color(75.0), CLOCK);
        assert_eq!(utilization_color(95.0), ERROR);
    }
}
