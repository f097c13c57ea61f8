//! English prompt templates for the deploy planner and diagnoser. Content
//! and structure follow the original implementation's prompts; wording is
//! rewritten, not translated.

pub const PLAN_SYSTEM_PROMPT: &str = "You are an operations expert. Return only valid JSON, with no markdown code fences.";

pub const DIAGNOSE_SYSTEM_PROMPT: &str = "You are an operations expert. Diagnose the failure and propose a fix. Return only valid JSON.";

/// Builds the deployment-planning prompt from collected project context.
pub fn build_plan_prompt(readme: &str, files: &str, key_file_contents: &str, env_info: &str) -> String {
    format!(
        "Analyze the following project and produce the best deployment plan.\n\n\
## Project information\nREADME:\n{readme}\n\n\
File listing:\n{files}\n\n\
## Key configuration file contents (important!)\n{key_file_contents}\n\n\
## Local environment\n{env_info}\n\n\
## Task\nThink step by step and produce a deployment plan:\n\n\
1. **Classify the project type** from the file listing and configuration contents.\n\
2. **Read the configuration**: extract ports, environment variables, and other key settings from Dockerfile/docker-compose.yml.\n\
3. **Check environment dependencies**: does the local environment satisfy what this project needs? What's missing?\n\
4. **Choose a deployment strategy**: Docker, run directly, or something else?\n\
5. **Produce concrete steps**: which commands need to run, in order?\n\n\
Important:\n\
- Port mappings MUST come from the Dockerfile's EXPOSE directive or docker-compose.yml's ports field. Never guess a port.\n\
- If the Dockerfile has `EXPOSE 5000`, use `-p 5000:5000`. If docker-compose.yml has `ports: [\"5000:5000\"]`, use that.\n\
- Environment variables should also come from the configuration files, not be invented.\n\n\
Return JSON only, with no markdown fences:\n\
{{\n\
  \"thinking\": [\"first step of your reasoning\", \"second step\", \"...\"],\n\
  \"project_type\": \"python/nodejs/docker/go/rust/unknown\",\n\
  \"env_check\": {{\"satisfied\": true, \"missing\": [], \"warnings\": []}},\n\
  \"steps\": [{{\"description\": \"...\", \"command\": \"...\", \"risk_level\": \"safe\"}}],\n\
  \"notes\": \"anything worth flagging\"\n\
}}\n\n\
Notes:\n\
- `thinking` records your step-by-step reasoning; make the logic at each step explicit.\n\
- Port configuration MUST come from Dockerfile/docker-compose.yml; never default to 8000 or 8080.\n\
- If the project has a docker-compose.yml, prefer `docker compose up -d`.\n\
- If the Docker daemon isn't running, the first step should start it.\n\
- Do not include `git clone`; the repository is already cloned.\n\
- Every command runs inside the project directory."
    )
}

/// Builds the error-diagnosis prompt for a single failed command.
pub fn build_diagnose_prompt(command: &str, error: &str, project_type: &str, project_dir: &str, known_files: &str, collected_info: &str) -> String {
    format!(
        "A command failed. You are an operations expert who must analyze the problem and propose a fix right now.\n\n\
## Failed command\n{command}\n\n\
## Error output\n{error}\n\n\
## Project context\nProject type: {project_type}\n\
Project directory: {project_dir}\n\
Known files: {known_files}\n\n\
## Information already collected\n{collected_info}\n\n\
## Important: solve this in one round\n\n\
You must return a complete fix this round. Do not explore unnecessarily.\n\n\
### Standard handling for common problems:\n\n\
**Port already in use (address already in use / port already in use)**\n\
- Do not diagnose the port conflict again. Directly rewrite the command to use a new port.\n\
- If the original port is 5000, switch to 5001; if it's 3000, switch to 3001.\n\
- Choose action \"fix\" and return the command using the new port directly.\n\n\
**Container name conflict (container name already in use)**\n\
- Run `docker rm -f` on the old container, then rerun.\n\n\
**Image not found (image not found)**\n\
- Try `docker build` to build a local image.\n\n\
**Missing configuration file (.env not found)**\n\
- Check for a `.env.example` and copy it directly.\n\n\
**Dependency installation failed**\n\
- Try an alternate installer (pip -> uv, npm -> pnpm).\n\n\
## Response format\n\n\
Return JSON only, with no markdown fences:\n\
{{\n\
  \"thinking\": [\"observation: the error says xxx\", \"analysis: this means yyy\", \"decision: I should zzz\"],\n\
  \"action\": \"fix|ask_user|edit_file|give_up\",\n\
  \"commands\": [\"fix command 1\", \"fix command 2\"],\n\
  \"new_command\": \"if the original command needs changing, the full replacement command\",\n\
  \"ask_user\": {{\"question\": \"...\", \"options\": [\"option1\", \"option2\"], \"context\": \"...\"}},\n\
  \"edit_file\": {{\"path\": \"...\", \"content\": \"...\", \"reason\": \"...\"}},\n\
  \"cause\": \"root cause of the problem\",\n\
  \"suggestion\": \"advice for the user if action is give_up\"\n\
}}\n\n\
### action meanings:\n\
- `fix`: run the fix commands, or retry with `new_command` replacing the original.\n\
- `ask_user`: a user choice is required (e.g. pick a port, confirm a deletion).\n\
- `edit_file`: edit a configuration file (confirmation is requested automatically).\n\
- `give_up`: this can't be resolved automatically.\n\n\
### Example: port 5000 already in use\n\n\
Input error: \"bind: address already in use\" (port 5000)\n\
Correct response:\n\
{{\n\
  \"thinking\": [\"observation: the error shows port 5000 in use\", \"analysis: a different port is needed\", \"decision: use port 5001 instead\"],\n\
  \"action\": \"fix\",\n\
  \"new_command\": \"docker run -d --name xxx -p 5001:5000 ...(other arguments unchanged)\",\n\
  \"cause\": \"port 5000 was in use\",\n\
  \"suggestion\": \"\"\n\
}}\n\n\
Note: do not return action=\"explore\" or action=\"diagnose\" -- those waste time."
    )
}
