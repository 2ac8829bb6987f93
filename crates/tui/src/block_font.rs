use std::collections::HashMap;

use once_cell::sync::Lazy;

const FONT_HEIGHT: usize = 5;
const FILL_CHAR: char = '█';
const GLYPH_SPACING: usize = 1;

type Glyph = [&'static str; FONT_HEIGHT];

static GLYPHS: Lazy<HashMap<char, Glyph>> = Lazy::new(|| {
    HashMap::from([
        ('A', [" 111 ", "1   1", "11111", "1   1", "1   1"]),
        ('B', ["1111 ", "1   1", "1111 ", "1   1", "1111 "]),
        ('C', [" 1111", "1    ", "1    ", "1    ", " 1111"]),
        ('D', ["1111 ", "1   1", "1   1", "1   1", "1111 "]),
        ('E', ["11111", "1    ", "111  ", "1    ", "11111"]),
        ('F', ["11111", "1    ", "111  ", "1    ", "1    "]),
        ('G', [" 1111", "1    ", "1  11", "1   1", " 111 "]),
        ('H', ["1   1", "1   1", "11111", "1   1", "1   1"]),
        ('I', ["11111", "  1  ", "  1  ", "  1  ", "11111"]),
        ('J', ["11111", "   1 ", "   1 ", "1  1 ", " 11  "]),
        ('K', ["1   1", "1  1 ", "11   ", "1  1 ", "1   1"]),
        ('L', ["1    ", "1    ", "1    ", "1    ", "11111"]),
        ('M', ["1   1", "11 11", "1 1 1", "1   1", "1   1"]),
        ('N', ["1   1", "11  1", "1 1 1", "1  11", "1   1"]),
        ('O', [" 111 ", "1   1", "1   1", "1   1", " 111 "]),
        ('P', ["1111 ", "1   1", "1111 ", "1    ", "1    "]),
        ('Q', [" 111 ", "1   1", "1 1 1", "1  1 ", " 11 1"]),
        ('R', ["1111 ", "1   1", "1111 ", "1  1 ", "1   1"]),
        ('S', [" 1111", "1    ", " 111 ", "    1", "1111 "]),
        ('T', ["11111", "  1  ", "  1  ", "  1  ", "  1  "]),
        ('U', ["1   1", "1   1", "1   1", "1   1", " 111 "]),
        ('V', ["1   1", "1   1", "1   1", " 1 1 ", "  1  "]),
        ('W', ["1   1", "1   1", "1 1 1", "11 11", "1   1"]),
        ('X', ["1   1", " 1 1 ", "  1  ", " 1 1 ", "1   1"]),
        ('Y', ["1   1", " 1 1 ", "  1  ", "  1  ", "  1  "]),
        ('Z', ["11111", "   1 ", "  1  ", " 1   ", "11111"]),
        ('0', [" 111 ", "1  11", "1 1 1", "11  1", " 111 "]),
        ('1', ["  1  ", " 11  ", "  1  ", "  1  ", "11111"]),
        ('2', [" 111 ", "1   1", "  11 ", " 1   ", "11111"]),
        ('3', ["1111 ", "    1", " 111 ", "    1", "1111 "]),
        ('4', ["1  1 ", "1  1 ", "11111", "   1 ", "   1 "]),
        ('5', ["11111", "1    ", "1111 ", "    1", "1111 "]),
        ('6', [" 111 ", "1    ", "1111 ", "1   1", " 111 "]),
        ('7', ["11111", "    1", "   1 ", "  1  ", " 1   "]),
        ('8', [" 111 ", "1   1", " 111 ", "1   1", " 111 "]),
        ('9', [" 111 ", "1   1", " 1111", "    1", " 111 "]),
        (' ', ["     ", "     ", "     ", "     ", "     "]),
        ('?', [" 111 ", "1   1", "  11 ", "     ", "  1  "]),
    ])
});

/// Render the provided text as banner lines using the block font.
pub fn render(text: &str) -> Vec<String> {
    let content: Vec<char> = text.chars().map(|c| c.to_ascii_uppercase()).collect();
    if content.is_empty() {
        return vec![String::new(); FONT_HEIGHT];
    }

    let mut lines = vec![String::new(); FONT_HEIGHT];
    for (index, ch) in content.iter().enumerate() {
        let glyph = GLYPHS.get(ch).or_else(|| GLYPHS.get(&'?')).unwrap();
        for (row_idx, row) in glyph.iter().enumerate() {
            if index > 0 {
                lines[row_idx].push_str(&" ".repeat(GLYPH_SPACING * 2));
            }
            for symbol in row.chars() {
                // double width for a chunky appearance
                let cell = if symbol == '1' { FILL_CHAR } else { ' ' };
                lines[row_idx].push(cell);
                lines[row_idx].push(cell);
            }
        }
    }

    lines
        .into_iter()
        .map(|line| line.trim_end().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_glyphs() {
        let lines = render("shoptui");
        assert_eq!(lines.len(), FONT_HEIGHT);
        assert!(lines.iter().any(|line| line.contains(FILL_CHAR)));
    }

    #[test]
    fn unknown_characters_fall_back() {
        let plain = render("~");
        let fallback = render("?");
        assert_eq!(plain, fallback);
    }

    #[test]
    fn empty_text_yields_blank_canvas() {
        let lines = render("");
        assert_eq!(lines.len(), FONT_HEIGHT);
        assert!(lines.iter().all(|line| line.is_empty()));
    }
}
