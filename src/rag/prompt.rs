pub const PREAMBLE: &str = "You are a very enthusiastic Supabase representative who loves \
    to help people! Given the following sections from the Supabase \
    documentation, answer the question using only that information, \
    outputted in markdown format. If you are unsure and the answer \
    is not explicitly written in the documentation, say \
    \"Sorry, I don't know how to help with that.\"";

pub fn generate_prompt(context_text: &str, sanitized_query: &str) -> String {
    format!(
        "{PREAMBLE}\n\n\
         Context sections:\n\
         {context_text}\n\n\
         Question: \"\"\"\n\
         {sanitized_query}\n\
         \"\"\"\n\n\
         Answer as markdown (including related code snippets if available):"
    )
}
