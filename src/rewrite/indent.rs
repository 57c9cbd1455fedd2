//! Indentation style detection and re-indentation.

use std::collections::BTreeMap;

const DEFAULT_WIDTH: usize = 4;

/// The file's indentation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentStyle {
    Spaces(usize),
    Tabs,
}

impl Default for IndentStyle {
    fn default() -> Self {
        IndentStyle::Spaces(DEFAULT_WIDTH)
    }
}

impl IndentStyle {
    /// Detect the style from already-indented lines.
    ///
    /// Tabs win when more lines start with a tab than with a space. The space
    /// width is the most common positive increase between consecutive
    /// non-blank lines, with ties going to the narrower width.
    pub fn detect(source: &str) -> Self {
        let mut tab_lines = 0usize;
        let mut space_lines = 0usize;
        let mut increases: BTreeMap<usize, usize> = BTreeMap::new();
        let mut previous = 0usize;

        for line in source.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match line.as_bytes()[0] {
                b'\t' => tab_lines += 1,
                b' ' => space_lines += 1,
                _ => {}
            }

            let width = line.bytes().take_while(|b| *b == b' ').count();
            if line.as_bytes().get(width) != Some(&b'\t') {
                if width > previous {
                    *increases.entry(width - previous).or_default() += 1;
                }
                previous = width;
            }
        }

        if tab_lines > space_lines {
            return IndentStyle::Tabs;
        }

        increases
            .into_iter()
            .fold(None, |best: Option<(usize, usize)>, (width, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((width, count)),
            })
            .map(|(width, _)| IndentStyle::Spaces(width))
            .unwrap_or_default()
    }

    /// One level of indentation.
    pub fn unit(&self) -> String {
        match self {
            IndentStyle::Spaces(width) => " ".repeat(*width),
            IndentStyle::Tabs => "\t".to_string(),
        }
    }

    /// `indent` plus one level.
    pub fn deeper(&self, indent: &str) -> String {
        format!("{}{}", indent, self.unit())
    }
}

/// Re-indent `text` so its least-indented line sits at `indent`.
///
/// Relative indentation between lines is kept. Blank lines stay empty.
pub fn reindent(text: &str, indent: &str) -> String {
    let common = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", indent, &line[common..])
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
