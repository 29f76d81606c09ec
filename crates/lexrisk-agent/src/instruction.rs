/// Fields the model must return, in prompt order.
pub const REPLY_FIELDS: [&str; 4] = ["risk_score", "explanation", "clause_type", "safer_version"];

/// Build the single user prompt sent to the remote model for one clause.
///
/// The model is asked for exactly the four [`REPLY_FIELDS`] as one JSON
/// object, with the clause text embedded verbatim at the end.
pub fn build_prompt(clause: &str) -> String {
    let mut s = String::from(
        "You are a legal document analysis assistant. Analyze the following legal clause and provide:\n\n\
         1. Risk score (0-5, where 0 is no risk and 5 is high risk)\n\
         2. Brief explanation of the risk\n\
         3. Clause type (e.g., 'Liability', 'Confidentiality', 'Termination', 'Governing Law', 'Indemnification')\n\
         4. A safer rewritten version of the clause\n\n",
    );
    s.push_str(&format!(
        "IMPORTANT: Return ONLY a valid JSON object with these exact keys: {}\n\n",
        REPLY_FIELDS.join(", ")
    ));
    s.push_str("Clause to analyze:\n");
    s.push_str(clause);
    s.push_str("\n\nJSON Response:");
    s
}
