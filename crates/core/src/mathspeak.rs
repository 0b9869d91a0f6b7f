//! Normalization of spoken math into a canonical comparable form.
//!
//! Speech recognition hands back phrases like "negative three over four"
//! where the exercise stores `-3/4`. Both sides are pushed through
//! [`normalize`] before answers are compared, so the comparison is
//! insensitive to casing, whitespace and the usual spoken renderings of
//! digits and operators.

/// Canonicalizes a spoken or written math expression.
///
/// Case-folds, collapses whitespace, maps number words to digits and
/// spoken operators to symbols, then concatenates the pieces so that
/// `"two"` and `"2"` (or `"x squared"` and `"x^2"`) compare equal.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| match c {
            ',' | '?' | '!' | ';' | ':' => ' ',
            _ => c,
        })
        .collect();

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let mut tokens: Vec<String> = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let word = words[i].trim_end_matches('.');
        if word.is_empty() {
            i += 1;
            continue;
        }
        match word {
            "the" | "a" | "an" => {}
            "plus" => tokens.push("+".into()),
            "minus" | "negative" => tokens.push("-".into()),
            "times" => tokens.push("*".into()),
            "multiplied" if peek(&words, i + 1) == Some("by") => {
                tokens.push("*".into());
                i += 1;
            }
            "over" => tokens.push("/".into()),
            "divided" if peek(&words, i + 1) == Some("by") => {
                tokens.push("/".into());
                i += 1;
            }
            "equals" => tokens.push("=".into()),
            "point" => tokens.push(".".into()),
            "squared" => append_suffix(&mut tokens, "^2"),
            "cubed" => append_suffix(&mut tokens, "^3"),
            "to" if peek(&words, i + 1) == Some("the")
                && peek(&words, i + 2) == Some("power")
                && peek(&words, i + 3) == Some("of") =>
            {
                tokens.push("^".into());
                i += 3;
            }
            other => match word_number(other) {
                Some(value) => push_number(&mut tokens, value),
                None => tokens.push(other.to_string()),
            },
        }
        i += 1;
    }
    tokens.concat()
}

fn peek<'a>(words: &'a [&'a str], index: usize) -> Option<&'a str> {
    words.get(index).map(|w| w.trim_end_matches('.'))
}

fn append_suffix(tokens: &mut Vec<String>, suffix: &str) {
    match tokens.last_mut() {
        Some(last) => last.push_str(suffix),
        None => tokens.push(suffix.to_string()),
    }
}

fn word_number(word: &str) -> Option<u32> {
    let n = match word {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(n)
}

// "twenty one" arrives as two words; fold the unit into the tens token.
fn push_number(tokens: &mut Vec<String>, value: u32) {
    if value < 10 {
        if let Some(last) = tokens.last_mut() {
            if let Ok(prev) = last.parse::<u32>() {
                if prev >= 20 && prev % 10 == 0 {
                    *last = (prev + value).to_string();
                    return;
                }
            }
        }
    }
    tokens.push(value.to_string());
}
