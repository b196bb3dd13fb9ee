//! Prompt templates for the three stages.
//!
//! Each later stage embeds the previous stage's reply verbatim.

/// Stage 1 instruction, sent alongside the image.
pub const DESCRIPTION_PROMPT: &str = "Describe the object in this image with 10 words or less.";

/// Stage 2 template. `{description}` is replaced with the stage 1 reply.
const MATERIALS_PROMPT: &str = "What are the materials of this object, in the response strictly \
only return a list in a 2d array structure as [[material, most likely production place],\
[material2, ...],...], maximum 5 materials, minimum 1. The object is: {description}";

/// Stage 3 template. `{materials}` is replaced with the stage 2 reply.
const COORDINATES_PROMPT: &str = "What are the coordinates of the places in the array: {materials} \
in the format [[place, latitude, longitude],[place2, latitude2, longitude2],...], strictly only \
return a list in a 2d array structure";

pub fn materials_prompt(description: &str) -> String {
    MATERIALS_PROMPT.replace("{description}", description)
}

pub fn coordinates_prompt(materials: &str) -> String {
    COORDINATES_PROMPT.replace("{materials}", materials)
}
