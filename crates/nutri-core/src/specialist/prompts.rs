//! Condition system instructions and prompt assembly.

use crate::condition::Condition;

const OUTPUT_FORMAT: &str = "\
OUTPUT FORMAT:

Breakfast:
- Option 1: ...
- Option 2: ...

Mid-morning snack:
- Option 1: ...
- Option 2: ...

Lunch:
- Option 1: ...
- Option 2: ...

Evening snack:
- Option 1: ...
- Option 2: ...

Dinner:
- Option 1: ...
- Option 2: ...

General Guidelines:";

const RESPOND_ONCE: &str = "\
- NEVER invent new \"Patient request\" sections. Respond ONLY once.
- NEVER ask follow-up questions.
- NEVER continue beyond the required meal plan.";

const DIABETES_RULES: &str = "\
You are a clinical diet specialist focused on Type 2 Diabetes management.

STRICT RULES:
- Do NOT recommend alcohol in any form.
- Do NOT recommend fruit juice, sweets, jaggery, honey, or refined flour items.
- Use ONLY Indian vegetarian foods (idli, dosa, upma, poha, roti, sabzi, dal, curd, millets, etc.).
- Focus on low-GI carbs, high fiber, adequate protein, and healthy fats.
- Keep portions realistic for an adult Indian patient.
- Keep the response under 300 words.";

const HYPERTENSION_RULES: &str = "\
You are a clinical diet specialist focused exclusively on hypertension (high blood pressure)
and cardiometabolic risk.

STRICT RULES:
- Base all advice ONLY on DASH (Dietary Approaches to Stop Hypertension).
- Prefer Indian vegetarian foods (dal, sabzi, roti, idli, dosa, sambar, upma, poha, millets).
- Strongly restrict sodium, pickles, papad, fried snacks, processed foods, bakery items,
  restaurant foods, and instant noodles.
- KEEP THE RESPONSE UNDER 300 WORDS.";

const KIDNEY_RULES: &str = "\
You are a renal diet specialist for adults with chronic kidney disease (CKD).

STRICT RULES:
- Limit potassium: avoid bananas, oranges, coconut water, potatoes, tomatoes in excess.
- Limit phosphorus: avoid colas, processed cheese, packaged and preserved foods.
- Limit sodium: no pickles, papad, salted snacks, or added salt at the table.
- Use ONLY Indian vegetarian foods (rice, roti, leached vegetables, moderate dal, paneer in small portions).
- Keep protein moderate and respect any fluid restriction the patient mentions.
- Keep the response under 300 words.";

const LIPIDS_RULES: &str = "\
You are a clinical diet specialist for dyslipidemia (high LDL, low HDL, high triglycerides).

STRICT RULES:
- Do NOT recommend ghee, butter, vanaspati, coconut oil in excess, or deep-fried foods.
- Do NOT recommend sweets, sugary drinks, refined flour items, or alcohol.
- Use ONLY Indian vegetarian foods (oats, millets, dal, sprouts, sabzi, nuts in small portions).
- Favor soluble fiber, plant sterols, and unsaturated fats.
- Keep the response under 300 words.";

const GENERAL_RULES: &str = "\
You are a clinical dietitian giving balanced everyday nutrition advice.

STRICT RULES:
- Do NOT recommend alcohol, sugary drinks, or deep-fried foods.
- Use ONLY Indian vegetarian foods (idli, dosa, upma, poha, roti, sabzi, dal, curd, millets, etc.).
- Balance whole grains, pulses, vegetables, fruit, and dairy across the day.
- Keep the response under 250 words.";

/// Guidance line that follows the `General Guidelines:` heading.
fn guidelines(condition: Condition) -> &'static str {
    match condition {
        Condition::Diabetes => "- 4-6 bullet points for lifestyle, carb control, and HbA1c reduction.",
        Condition::Hypertension => "- 4-6 bullet points of lifestyle and salt-reduction advice.",
        Condition::Kidney => "- 4-6 bullet points on potassium, phosphorus, sodium, and fluid control.",
        Condition::Lipids => "- 4-6 bullet points on fats, fiber, activity, and weight management.",
        Condition::General => "- 4-6 bullet points of general healthy-eating advice.",
    }
}

fn rules(condition: Condition) -> &'static str {
    match condition {
        Condition::Diabetes => DIABETES_RULES,
        Condition::Hypertension => HYPERTENSION_RULES,
        Condition::Kidney => KIDNEY_RULES,
        Condition::Lipids => LIPIDS_RULES,
        Condition::General => GENERAL_RULES,
    }
}

/// Closing directive placed after the patient's message.
pub fn output_directive(condition: Condition) -> &'static str {
    match condition {
        Condition::Diabetes => "Provide the 1-day diabetes meal plan now:",
        Condition::Hypertension => "Provide the diet plan now:",
        Condition::Kidney => "Provide the 1-day kidney-friendly meal plan now:",
        Condition::Lipids => "Provide the 1-day lipid-lowering meal plan now:",
        Condition::General => "Provide the 1-day meal plan now:",
    }
}

/// Full system instructions for `condition`.
pub fn system_prompt(condition: Condition) -> String {
    format!(
        "{rules}\n{RESPOND_ONCE}\n\n{OUTPUT_FORMAT}\n{guidelines}\n\nSTOP AFTER THIS EXACT FORMAT. DO NOT CONTINUE FURTHER.",
        rules = rules(condition),
        guidelines = guidelines(condition),
    )
}

/// System instructions + literal user message + output directive.
pub fn build_prompt(condition: Condition, user_message: &str) -> String {
    format!(
        "{}\n\nPatient request:\n{}\n\n{}\n",
        system_prompt(condition),
        user_message.trim(),
        output_directive(condition)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTIONS: [&str; 6] = [
        "Breakfast:",
        "Mid-morning snack:",
        "Lunch:",
        "Evening snack:",
        "Dinner:",
        "General Guidelines:",
    ];

    #[test]
    fn every_prompt_lists_sections_in_order() {
        for condition in Condition::ALL {
            let prompt = system_prompt(condition);
            let positions: Vec<usize> = SECTIONS
                .iter()
                .map(|s| prompt.find(s).unwrap_or_else(|| panic!("{condition}: missing {s}")))
                .collect();
            assert!(
                positions.windows(2).all(|w| w[0] < w[1]),
                "{condition}: sections out of order"
            );
        }
    }

    #[test]
    fn every_prompt_has_word_ceiling_and_single_response() {
        for condition in Condition::ALL {
            let prompt = system_prompt(condition).to_lowercase();
            assert!(prompt.contains("words"), "{condition}: no word ceiling");
            assert!(prompt.contains("respond only once"), "{condition}: no single-response rule");
        }
    }

    #[test]
    fn build_prompt_embeds_trimmed_message_then_directive() {
        let prompt = build_prompt(Condition::Diabetes, "  I am 52 with HbA1c 8.1  \n");
        let message_at = prompt.find("Patient request:\nI am 52 with HbA1c 8.1\n").unwrap();
        let directive_at = prompt.find("Provide the 1-day diabetes meal plan now:").unwrap();
        assert!(message_at < directive_at);
        assert!(prompt.starts_with("You are a clinical diet specialist focused on Type 2"));
    }

    #[test]
    fn prompts_differ_per_condition() {
        let kidney = system_prompt(Condition::Kidney);
        let lipids = system_prompt(Condition::Lipids);
        assert!(kidney.contains("potassium"));
        assert!(lipids.contains("LDL"));
        assert_ne!(kidney, lipids);
    }
}
