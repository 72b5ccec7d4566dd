//! Prompts for the crop disease vision-model call.

/// System instruction constraining the model to the diagnosis JSON shape.
pub fn diagnosis_system_prompt() -> &'static str {
    r#"You are an expert in crop disease and pest diagnosis. Analyze the plant in the image, identify the crop type and any disease or pest damage, and give a diagnosis. Respond with JSON only, in this shape: {"crop":"crop name","disease":"disease name or healthy","severity":"healthy/mild/moderate/severe","confidence":0.0-1.0,"description":"description of the finding","treatment":["treatment step 1","treatment step 2"],"prevention":["prevention step 1","prevention step 2"]}"#
}

/// User turn accompanying the image.
pub fn diagnosis_user_prompt() -> &'static str {
    "Diagnose the health of the crop in this photo, identify any disease or \
     pest damage, and recommend treatment and prevention steps."
}
