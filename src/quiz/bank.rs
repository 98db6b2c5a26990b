//! The built-in question bank and random draws from it.

use rand::Rng;

use super::answer::AnswerSpec;

/// Prompt and accepted answers, parsed once at load.
#[derive(Debug, Clone)]
pub struct BankEntry {
    pub prompt: String,
    pub spec: AnswerSpec,
}

#[derive(Debug, Clone)]
pub struct QuestionBank {
    entries: Vec<BankEntry>,
}

impl QuestionBank {
    /// Bounded redraw budget when avoiding an immediate repeat.
    const NO_REPEAT_RETRIES: usize = 50;

    /// Builds a bank from `(prompt, accepted answers)` rows.
    pub fn from_table(rows: &[(&str, &str)]) -> Self {
        assert!(!rows.is_empty(), "a question bank needs at least one question");
        let entries = rows
            .iter()
            .map(|(prompt, answer)| BankEntry {
                prompt: (*prompt).to_string(),
                spec: AnswerSpec::parse(answer),
            })
            .collect();
        QuestionBank { entries }
    }

    pub fn builtin() -> Self {
        Self::from_table(BUILTIN_QUESTIONS)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BankEntry> {
        self.entries.get(index)
    }

    /// Draws a random question, redrawing a bounded number of times to avoid
    /// `excluding`. If the budget runs out (or the bank has a single entry)
    /// a repeat is allowed rather than spinning.
    pub fn draw(&self, excluding: Option<usize>) -> (usize, &BankEntry) {
        let mut rng = rand::thread_rng();
        let mut index = rng.gen_range(0..self.entries.len());
        if let Some(excluded) = excluding {
            if self.entries.len() > 1 {
                for _ in 0..Self::NO_REPEAT_RETRIES {
                    if index != excluded {
                        break;
                    }
                    index = rng.gen_range(0..self.entries.len());
                }
            }
        }
        (index, &self.entries[index])
    }
}

const BUILTIN_QUESTIONS: &[(&str, &str)] = &[
    // Basic arithmetic
    ("What is 2 + 2?", "4"),
    ("What is 15 - 7?", "8"),
    ("What is 6 × 9?", "54"),
    ("What is 144 ÷ 12?", "12"),
    ("What is 3^4?", "81"),
    ("What is √144?", "12 or sqrt(144)"),
    ("What is 5! (factorial)?", "120"),
    ("What is 15% of 200?", "30"),
    ("What is 0.25 as a fraction?", "1/4"),
    ("What is 3/4 + 1/2?", "5/4 or 1.25 or 1 1/4"),
    ("What is 2^10?", "1024"),
    ("What is the next prime number after 7?", "11"),
    ("What is 1.5 × 2.5?", "3.75"),
    ("What is 1000 ÷ 8?", "125"),
    ("What is 17 × 3?", "51"),
    // Algebra
    ("Solve for x: 3x + 5 = 20", "5 or x=5"),
    ("Factor x² - 9", "(x+3)(x-3) or (x-3)(x+3)"),
    ("Simplify 2(x + 3) + 4x", "6x + 6"),
    ("Solve for y: 2y - 7 = 15", "11 or y=11"),
    ("Expand (x + 2)(x - 3)", "x**2 - x - 6 or x^2 - x - 6"),
    ("What is the slope of y = 2x + 5?", "2"),
    ("Solve the system: x + y = 5, x - y = 1", "x=3, y=2 or (3, 2)"),
    ("Simplify (x³ * x⁵) / x²", "x**6 or x^6"),
    (
        "Solve the quadratic: x² - 5x + 6 = 0",
        "x=2, x=3 or x=3, x=2 or 2, 3 or 3, 2",
    ),
    ("What is the vertex of y = x² - 4x + 3?", "(2, -1)"),
    // Geometry, rounded to two decimals where pi is involved
    ("Area of circle with radius 5 (use pi ≈ 3.14159)", "78.54"),
    (
        "Circumference of circle with diameter 10 (use pi ≈ 3.14159)",
        "31.42",
    ),
    ("Volume of cube with side length 3", "27"),
    ("Length of hypotenuse for right triangle with legs 3 and 4", "5"),
    ("Sum of interior angles of a hexagon (degrees)", "720"),
    ("Area of triangle with base 6 height 4", "12"),
    (
        "Surface area of sphere with radius 2 (use pi ≈ 3.14159)",
        "50.27",
    ),
    (
        "Volume of cylinder with radius 3 height 5 (use pi ≈ 3.14159)",
        "141.37",
    ),
    ("Diagonal length of a 5 by 12 rectangle", "13"),
    (
        "Measure of one exterior angle of a regular octagon (degrees)",
        "45",
    ),
    // Calculus
    ("Derivative of x³ w.r.t x", "3*x**2 or 3*x^2"),
    ("Integral of 2x dx (ignore the constant)", "x**2 or x^2"),
    ("Derivative of sin(x) w.r.t x", "cos(x)"),
    ("Limit as x→0 of (sin x)/x", "1"),
    ("Integral of e^x dx (ignore the constant)", "exp(x) or e**x or e^x"),
    // Word problems
    (
        "If 5 apples cost $2.50, what is the price per apple in dollars?",
        "0.50 or 0.5",
    ),
    (
        "A train travels 300 km in 2 hours. What is its average speed in km/h?",
        "150",
    ),
    (
        "A rectangle has an area of 24 sq units and length 6 units. What is its width?",
        "4",
    ),
    (
        "What is the final price of a $50 item after a 20% discount?",
        "40 or $40",
    ),
    (
        "If 3 pencils cost $1.20, how much do 5 pencils cost in dollars?",
        "2.00 or 2",
    ),
    // Fun
    ("What is the answer to life, the universe, and everything?", "42"),
    ("secret question - type skibidi sigma rizzler", "skibidi sigma rizzler"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::answer::{is_correct, DEFAULT_TOLERANCE};

    #[test]
    fn builtin_bank_loads() {
        let bank = QuestionBank::builtin();
        assert!(bank.len() > 40);
        for index in 0..bank.len() {
            let entry = bank.get(index).expect("index in range");
            assert!(!entry.prompt.is_empty());
            assert!(!entry.spec.is_empty(), "empty answers for {}", entry.prompt);
        }
    }

    #[test]
    fn every_question_accepts_its_first_listed_answer() {
        let bank = QuestionBank::builtin();
        for index in 0..bank.len() {
            let entry = bank.get(index).expect("index in range");
            let first = entry
                .spec
                .display()
                .split(" or ")
                .next()
                .expect("at least one form");
            assert!(
                is_correct(first, &entry.spec, DEFAULT_TOLERANCE),
                "{} rejected its own answer {first}",
                entry.prompt
            );
        }
    }

    #[test]
    fn draw_avoids_immediate_repeats() {
        let bank = QuestionBank::builtin();
        let (previous, _) = bank.draw(None);
        for _ in 0..100 {
            let (index, _) = bank.draw(Some(previous));
            assert_ne!(index, previous);
        }
    }

    #[test]
    fn single_question_bank_may_repeat() {
        let bank = QuestionBank::from_table(&[("What is 2 + 2?", "4")]);
        let (index, entry) = bank.draw(Some(0));
        assert_eq!(index, 0);
        assert_eq!(entry.prompt, "What is 2 + 2?");
    }

    #[test]
    #[should_panic(expected = "at least one question")]
    fn empty_table_is_a_construction_error() {
        QuestionBank::from_table(&[]);
    }
}
