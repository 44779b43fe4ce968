use super::PriorFeedback;

pub const WRITER_SYSTEM: &str = "You are a senior long-form writer for a technical publication. \
You research carefully, cite concrete sources, and write clear, well-structured Markdown \
for an audience of experienced professionals.";

pub const EDITOR_SYSTEM: &str = "You are an editor who revises drafts until they are ready \
to publish. You address every point of the review you are given while keeping the \
article's core message intact.";

pub const EVALUATOR_SYSTEM: &str = "You are a strict publication editor. You grade drafts \
honestly on a 0-10 scale where 9-10 means ready to publish without changes, 7-8 means \
minor revisions, and anything lower needs substantial work.";

pub fn first_draft(topic: &str) -> String {
    format!(
        "Write a complete article on: \"{topic}\"\n\
         \n\
         Requirements:\n\
         - open with a hook and close with a clear conclusion\n\
         - use H2/H3 headings and keep sections focused\n\
         - back claims with recent data and name your sources\n\
         - include practical, actionable takeaways\n\
         \n\
         Output only the article in Markdown, with no commentary."
    )
}

pub fn revision(topic: &str, prior: &PriorFeedback) -> String {
    let score = prior
        .score
        .map_or_else(|| "unscored".to_string(), |s| format!("{s}/10"));
    format!(
        "Revise this article on \"{topic}\".\n\
         \n\
         Current score: {score}\n\
         \n\
         Review to address:\n\
         {review}\n\
         \n\
         Current article:\n\
         {article}\n\
         \n\
         Output only the revised article in Markdown, with no commentary.",
        review = prior.combined(),
        article = prior.previous_article,
    )
}

pub fn evaluation(text: &str) -> String {
    format!(
        "Grade the following article.\n\
         \n\
         Consider research depth, structure, writing quality and practical value.\n\
         Respond with ONLY valid JSON, no other text:\n\
         {{\"score\": <integer 0-10>, \"feedback\": \"<specific critique and concrete improvements>\"}}\n\
         \n\
         Article:\n\
         {text}"
    )
}
