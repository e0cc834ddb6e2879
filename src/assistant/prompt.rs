//! Prompt text and report composition for the assistant.

use chrono::{Datelike, NaiveDate};

use crate::models::{Scan, User};

/// Instruction pinned to every model session.
pub const SYSTEM_INSTRUCTION: &str = "You are an assistant anemia analyze. \
you provide advice on how to cure or prevent anemia based on the image and \
report given to you";

/// Fixed greeting appended after the opening advice of a new session.
pub const WELCOME_MESSAGE: &str = "Silahkan bertanya!";

/// Caption stored with the scan image message that opens a session.
pub const SCAN_IMAGE_CAPTION: &str = "Eye scan image for analysis";

/// Substituted when the model returns an empty or whitespace-only reply.
pub const APOLOGY_FALLBACK: &str = "Maaf, saya tidak dapat memberikan \
jawaban saat ini. Silakan coba beberapa saat lagi.";

/// Title given to every newly created chat session.
pub const SESSION_TITLE: &str = "Anemia Analysis Chat";

/// Full years between `birthdate` and `today`, decremented when the
/// birthday has not yet passed this year.
pub fn compute_age(birthdate: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birthdate.year();
    if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
        age -= 1;
    }
    age
}

/// Opening prompt for a session anchored to an explicit scan. Embeds the
/// scan identity and verdict as text and steers the model to greet first.
pub fn scan_opening_prompt(user: &User, scan: &Scan, today: NaiveDate) -> String {
    let label = if scan.scan_result {
        "Anemic"
    } else {
        "Non-Anemic"
    };
    let mut prompt = format!(
        "I just received an anemia screening result.\nScan id: {}\nImage: {}\n\
Detection: {}\nConfidence: {:.1}%\nScan date: {}",
        scan.scan_id,
        scan.photo_url,
        label,
        scan.confidence * 100.0,
        scan.scan_date.format("%Y-%m-%d %H:%M"),
    );
    if let Some(birthdate) = user.birthdate {
        prompt.push_str(&format!("\nMy age: {}", compute_age(birthdate, today)));
    }
    prompt.push_str(
        "\nGreet me by name first, then explain this result and give advice \
on how to cure or prevent anemia.",
    );
    prompt
}

/// Textual screening report handed to the model together with the scan
/// image when a session starts.
pub fn scan_report(user: &User, scan: &Scan, today: NaiveDate) -> String {
    let label = if scan.scan_result {
        "Anemic"
    } else {
        "Non-Anemic"
    };
    let confidence_pct = scan.confidence * 100.0;

    let mut report = format!(
        "Screening report for {}.\nDetection: {}\nConfidence: {:.1}%",
        user.username, label, confidence_pct
    );
    if let Some(birthdate) = user.birthdate {
        report.push_str(&format!("\nAge: {}", compute_age(birthdate, today)));
    }
    report.push_str(
        "\nBased on this eye conjunctiva scan and report, give advice on how \
to cure or prevent anemia.",
    );
    report
}
