//! Sample catalog installed by `app seed`.

use quiz_core::model::{
    AnswerOption, OptionId, Question, QuestionId, QuestionKind, QuestionSet, QuestionSetId,
    SetStatus,
};

/// `(text, options, index of the correct option)`
type Draft = (&'static str, &'static [&'static str], usize);

const WEEK_1: &[Draft] = &[
    (
        "Which planet is closest to the Sun?",
        &["Venus", "Mercury", "Mars", "Earth"],
        1,
    ),
    ("The Moon produces its own light.", &["True", "False"], 1),
    (
        "What gas do plants absorb from the air?",
        &["Oxygen", "Nitrogen", "Carbon dioxide"],
        2,
    ),
    ("Sound travels faster than light.", &["True", "False"], 1),
];

const WEEK_2: &[Draft] = &[
    (
        "What is the chemical symbol for water?",
        &["H2O", "CO2", "O2", "NaCl"],
        0,
    ),
    ("Ice is less dense than liquid water.", &["True", "False"], 0),
    (
        "Which of these is a noble gas?",
        &["Hydrogen", "Helium", "Oxygen", "Carbon", "Iron"],
        1,
    ),
];

const WEEK_3: &[Draft] = &[
    (
        "How many chambers does the human heart have?",
        &["Two", "Three", "Four", "Six"],
        2,
    ),
    ("Red blood cells carry oxygen.", &["True", "False"], 0),
    (
        "Which organ produces insulin?",
        &["Liver", "Pancreas", "Kidney", "Stomach"],
        1,
    ),
    ("Bones are living tissue.", &["True", "False"], 0),
    (
        "What is the largest organ of the human body?",
        &["Skin", "Liver", "Brain", "Lungs"],
        0,
    ),
];

fn build_week(
    id: u64,
    title: &str,
    description: &str,
    video_ref: &str,
    drafts: &[Draft],
) -> Result<QuestionSet, quiz_core::Error> {
    let mut questions = Vec::with_capacity(drafts.len());
    for (q_idx, (text, options, correct)) in (1_u64..).zip(drafts) {
        let kind = if options.len() == 2 {
            QuestionKind::TrueFalse
        } else {
            QuestionKind::MultipleChoice
        };
        let question_id = id * 100 + q_idx;
        let options = (1_u64..)
            .zip(options.iter())
            .enumerate()
            .map(|(pos, (o_idx, text))| {
                AnswerOption::new(
                    OptionId::new(question_id * 10 + o_idx),
                    *text,
                    pos == *correct,
                )
            })
            .collect();
        questions.push(Question::new(
            QuestionId::new(question_id),
            *text,
            kind,
            options,
        )?);
    }

    Ok(QuestionSet::new(
        QuestionSetId::new(id),
        title,
        Some(description.to_owned()),
        i64::try_from(id).unwrap_or(i64::MAX) * 10,
        Some(video_ref),
        SetStatus::Active,
        questions,
    )?)
}

/// Three sequential weeks of general science questions.
///
/// # Errors
///
/// Returns `quiz_core::Error` if a built-in question fails validation.
pub fn sample_catalog() -> Result<Vec<QuestionSet>, quiz_core::Error> {
    Ok(vec![
        build_week(
            1,
            "Week 1: The Solar System",
            "Planets, light and the air around us.",
            "https://videos.example.com/week-1",
            WEEK_1,
        )?,
        build_week(
            2,
            "Week 2: Matter",
            "Elements, compounds and states of water.",
            "https://videos.example.com/week-2",
            WEEK_2,
        )?,
        build_week(
            3,
            "Week 3: The Human Body",
            "Organs and what they do.",
            "https://videos.example.com/week-3",
            WEEK_3,
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::progress::ordered_active_sets;

    #[test]
    fn sample_catalog_is_valid_and_ordered() {
        let sets = sample_catalog().unwrap();
        let ordered: Vec<u64> = ordered_active_sets(&sets)
            .iter()
            .map(|s| s.id().value())
            .collect();
        assert_eq!(ordered, vec![1, 2, 3]);

        let week1 = &sets[0];
        assert_eq!(week1.question_count(), 4);
        let q = &week1.questions()[0];
        assert_eq!(q.kind(), QuestionKind::MultipleChoice);
        assert_eq!(q.correct_option_id(), OptionId::new(1012));
        assert_eq!(week1.questions()[1].kind(), QuestionKind::TrueFalse);
    }
}
