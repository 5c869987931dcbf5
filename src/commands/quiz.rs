use anyhow::{Result, bail};
use dialoguer::{Input, Select, theme::ColorfulTheme};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::card::FlashcardRecord;
use crate::crud::FlashcardStore;
use crate::palette::Palette;
use crate::utils::{ask_yn, pluralize};

const ALL: &str = "All";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuizFilter {
    pub subject: Option<String>,
    pub subtopic: Option<String>,
    pub limit: Option<usize>,
}

impl QuizFilter {
    pub fn matches(&self, record: &FlashcardRecord) -> bool {
        self.subject.as_deref().is_none_or(|s| record.subject == s)
            && self.subtopic.as_deref().is_none_or(|t| record.subtopic == t)
    }

    /// The limit, ignoring zero.
    pub fn cap(&self) -> Option<usize> {
        self.limit.filter(|&limit| limit > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Correct,
    Incorrect,
    Quit,
}

impl Response {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(Response::Correct),
            "n" | "no" => Some(Response::Incorrect),
            "q" | "quit" | "exit" => Some(Response::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Excellent,
    Great,
    Good,
    KeepPracticing,
}

impl Verdict {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Verdict::Excellent
        } else if percentage >= 80.0 {
            Verdict::Great
        } else if percentage >= 70.0 {
            Verdict::Good
        } else {
            Verdict::KeepPracticing
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Verdict::Excellent => "Excellent work!",
            Verdict::Great => "Great job!",
            Verdict::Good => "Good effort!",
            Verdict::KeepPracticing => "Keep practicing!",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuizResults {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub wrong: Vec<FlashcardRecord>,
}

impl QuizResults {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, card: &FlashcardRecord, response: Response) {
        match response {
            Response::Correct => self.correct += 1,
            Response::Incorrect => {
                self.incorrect += 1;
                self.wrong.push(card.clone());
            }
            Response::Quit => {}
        }
    }

    pub fn answered(&self) -> usize {
        self.correct + self.incorrect
    }

    pub fn percentage(&self) -> Option<f64> {
        let answered = self.answered();
        (answered > 0).then(|| self.correct as f64 / answered as f64 * 100.0)
    }
}

/// Filter, shuffle and cap the deck for one session.
pub fn select_cards<R: Rng + ?Sized>(
    records: &[FlashcardRecord],
    filter: &QuizFilter,
    rng: &mut R,
) -> Vec<FlashcardRecord> {
    let mut cards: Vec<FlashcardRecord> = records
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect();
    cards.shuffle(rng);
    if let Some(limit) = filter.cap() {
        cards.truncate(limit);
    }
    cards
}

pub async fn run(store: &FlashcardStore, filter: QuizFilter) -> Result<()> {
    println!("Loading flashcards...");
    let records = store.load_all_records().await?;
    if records.is_empty() {
        bail!(
            "No flashcards found in {}. Generate some first.",
            store.output_dir().display()
        );
    }
    println!(
        "Loaded {}.",
        Palette::paint(Palette::INFO, pluralize("flashcard", records.len()))
    );

    loop {
        let filter = complete_filter(&records, filter.clone())?;
        let cards = select_cards(&records, &filter, &mut rand::rng());
        if cards.is_empty() {
            println!("{}", Palette::paint(Palette::WARNING, "No flashcards match that selection."));
        } else {
            let results = run_session(&cards)?;
            print_results(&results);
        }

        if !ask_yn("Would you like to take another quiz?")? {
            break;
        }
    }
    Ok(())
}

fn complete_filter(records: &[FlashcardRecord], mut filter: QuizFilter) -> Result<QuizFilter> {
    let theme = ColorfulTheme::default();

    if filter.subject.is_none() {
        let subjects = distinct(records.iter().map(|r| r.subject.as_str()));
        filter.subject = choose(&theme, "Subject", subjects)?;
    }

    if filter.subtopic.is_none() {
        let subtopics = distinct(
            records
                .iter()
                .filter(|r| filter.subject.as_deref().is_none_or(|s| r.subject == s))
                .map(|r| r.subtopic.as_str()),
        );
        filter.subtopic = choose(&theme, "Subtopic", subtopics)?;
    }

    if filter.limit.is_none() {
        let raw: String = Input::with_theme(&theme)
            .with_prompt("How many questions? (blank for all)")
            .allow_empty(true)
            .validate_with(|input: &String| -> Result<(), &str> {
                if input.trim().is_empty() || input.trim().parse::<usize>().is_ok() {
                    Ok(())
                } else {
                    Err("Enter a whole number or leave blank")
                }
            })
            .interact_text()?;
        filter.limit = raw.trim().parse::<usize>().ok().filter(|&n| n > 0);
    }

    Ok(filter)
}

fn choose(theme: &ColorfulTheme, prompt: &str, options: Vec<String>) -> Result<Option<String>> {
    if options.len() <= 1 {
        return Ok(options.into_iter().next());
    }
    let mut items = vec![ALL.to_string()];
    items.extend(options);
    let picked = Select::with_theme(theme)
        .with_prompt(prompt)
        .items(&items)
        .default(0)
        .interact()?;
    Ok((picked > 0).then(|| items[picked].clone()))
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = values.map(str::to_string).collect();
    out.sort();
    out.dedup();
    out
}

fn run_session(cards: &[FlashcardRecord]) -> Result<QuizResults> {
    let theme = ColorfulTheme::default();
    let mut results = QuizResults::new(cards.len());

    for (i, card) in cards.iter().enumerate() {
        println!("\n{}", Palette::header(&format!("QUESTION {} OF {}", i + 1, cards.len())));
        println!(
            "{} {} / {}",
            Palette::dim("Subject:"),
            card.subject,
            card.subtopic
        );
        println!("{} {}", Palette::dim("Source:"), card.source_file);
        println!("\n{} {}", Palette::paint(Palette::ACCENT, "Q:"), card.question);

        let _: String = Input::with_theme(&theme)
            .with_prompt("Press Enter to see the answer")
            .allow_empty(true)
            .interact_text()?;
        println!("{} {}", Palette::paint(Palette::SUCCESS, "A:"), card.answer);

        let raw: String = Input::with_theme(&theme)
            .with_prompt("Did you get it right? (y/n, q to quit)")
            .validate_with(|input: &String| -> Result<(), &str> {
                Response::parse(input)
                    .map(|_| ())
                    .ok_or("Please enter y, n, or q")
            })
            .interact_text()?;
        let response = Response::parse(&raw).unwrap_or(Response::Quit);

        if response == Response::Quit {
            println!(
                "Quiz ended early. Answered {} of {} questions.",
                results.answered(),
                results.total
            );
            break;
        }
        results.record(card, response);
        match response {
            Response::Correct => println!("{}", Palette::paint(Palette::SUCCESS, "Correct!")),
            _ => println!("{}", Palette::paint(Palette::DANGER, "Incorrect.")),
        }
    }

    Ok(results)
}

fn print_results(results: &QuizResults) {
    println!("\n{}", Palette::header("QUIZ RESULTS"));

    let Some(percentage) = results.percentage() else {
        println!("No questions were answered.");
        return;
    };

    println!(
        "{} {} of {}",
        Palette::dim("Questions answered:"),
        results.answered(),
        results.total
    );
    println!(
        "{} {}",
        Palette::dim("Correct:"),
        Palette::paint(Palette::SUCCESS, results.correct)
    );
    println!(
        "{} {}",
        Palette::dim("Incorrect:"),
        Palette::paint(Palette::DANGER, results.incorrect)
    );
    println!(
        "{} {}",
        Palette::dim("Score:"),
        Palette::bold(format!("{percentage:.1}%"))
    );
    println!(
        "{}",
        Palette::paint(Palette::ACCENT, Verdict::from_percentage(percentage).message())
    );

    if !results.wrong.is_empty() {
        println!("\n{}", Palette::bold("Review: questions you got wrong"));
        for (i, card) in results.wrong.iter().enumerate() {
            println!("\n{}. [{} / {}]", i + 1, card.subject, card.subtopic);
            println!("Q: {}", card.question);
            println!("A: {}", card.answer);
        }
    }
}
