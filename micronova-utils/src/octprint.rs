use std::fmt::Write;

/// Words shown on each line of a dump.
const WORDS_PER_LINE: usize = 8;

/// Width of the word columns: eight 6-digit words, six single spaces and one
/// double space.
const WORD_COLUMNS: usize = WORDS_PER_LINE * 6 + 8;

/// Nicely format the given words as an octal block, the way a Nova front
/// panel listing reads. The listed addresses will start from `start`.
///
/// Each line holds an address, eight words split into two groups of four,
/// and the two bytes of every word (high byte first) as ASCII.
pub fn pretty_print_octal_block(buf: &[u16], start: usize) -> String {
    let mut str = String::with_capacity((buf.len() / WORDS_PER_LINE + 1) * 90);
    for (line, words) in buf.chunks(WORDS_PER_LINE).enumerate() {
        if line > 0 {
            str.push('\n');
        }
        write!(str, "{:06o}    ", start + line * WORDS_PER_LINE).unwrap();

        let mut columns = String::with_capacity(WORD_COLUMNS);
        for (i, word) in words.iter().enumerate() {
            match i {
                0 => {}
                4 => columns.push_str("  "),
                _ => columns.push(' '),
            }
            write!(columns, "{:06o}", word).unwrap();
        }
        write!(str, "{:<width$}", columns, width = WORD_COLUMNS).unwrap();

        str.push_str("  |");
        for word in words {
            let [high, low] = word.to_be_bytes();
            str.push(printable(high));
            str.push(printable(low));
        }
        str.push('|');
    }

    str
}

/// Shortcut for starting the addresses at zero.
#[inline]
pub fn pretty_print_octal_block_zero(buf: &[u16]) -> String {
    pretty_print_octal_block(buf, 0)
}

fn printable(chr: u8) -> char {
    // Nova text is often stored with the parity bit set.
    match chr & 0x7F {
        c @ 32..=126 => c.into(),
        _ => '.',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_line() {
        let words = [0o040502, 0o000001, 0o177777];
        assert_eq!(
            pretty_print_octal_block(&words, 0o400),
            "000400    040502 000001 177777                                      |AB....|"
        );
    }

    #[test]
    fn test_two_lines() {
        let words: Vec<u16> = (0..9).collect();
        let dump = pretty_print_octal_block_zero(&words);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "000000    000000 000001 000002 000003  000004 000005 000006 000007  |................|"
        );
        assert!(lines[1].starts_with("000010    000010 "));
        assert!(lines[1].ends_with("  |..|"));
        assert_eq!(lines[0].find('|'), lines[1].find('|'));
    }
}
