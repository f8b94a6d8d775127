//! Project and chat management commands

use std::error::Error;
use std::io::Write;

use crate::core::app::ChatApp;
use crate::core::error::{ChatError, Precondition};

pub fn add_project(app: &mut ChatApp, name: &str, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let project = app.create_project(name)?;
    writeln!(out, "✅ Created project {} ({})", project.name, project.id)?;
    Ok(())
}

pub fn remove_project(app: &mut ChatApp, id: &str, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let Some(project) = app.repository().project(id).cloned() else {
        return Err(ChatError::from(Precondition::UnknownProject(id.to_string())).into());
    };
    let chat_count = app.repository().chats_for_project(id).count();
    app.delete_project(id)?;
    writeln!(
        out,
        "✅ Removed project {} and {chat_count} chat(s)",
        project.name
    )?;
    Ok(())
}

pub fn list_projects(app: &ChatApp, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let repository = app.repository();
    if repository.projects().is_empty() {
        writeln!(out, "No projects yet. Create one with 'chatdeck project add <name>'.")?;
        return Ok(());
    }
    for project in repository.projects() {
        let chats = repository.chats_for_project(&project.id).count();
        writeln!(out, "  • {} ({}) - {chats} chat(s)", project.name, project.id)?;
    }
    Ok(())
}

pub fn add_chat(
    app: &mut ChatApp,
    project_id: &str,
    name: &str,
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    app.select_project(project_id)?;
    let chat = app.create_chat(name)?;
    writeln!(out, "✅ Created chat {} ({})", chat.name, chat.id)?;
    Ok(())
}

pub fn remove_chat(app: &mut ChatApp, id: &str, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let Some(chat) = app.repository().chat(id).cloned() else {
        return Err(ChatError::from(Precondition::UnknownChat(id.to_string())).into());
    };
    app.delete_chat(id)?;
    writeln!(out, "✅ Removed chat {}", chat.name)?;
    Ok(())
}

pub fn list_chats(
    app: &ChatApp,
    project_id: Option<&str>,
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    let repository = app.repository();
    let projects: Vec<_> = match project_id {
        Some(id) => {
            let project = repository
                .project(id)
                .ok_or_else(|| ChatError::from(Precondition::UnknownProject(id.to_string())))?;
            vec![project]
        }
        None => repository.projects().iter().collect(),
    };

    let mut any = false;
    for project in projects {
        for chat in repository.chats_for_project(&project.id) {
            let messages = repository.messages(&chat.id).map_or(0, <[_]>::len);
            writeln!(
                out,
                "  • {} ({}) in {} - {messages} message(s)",
                chat.name, chat.id, project.name
            )?;
            any = true;
        }
    }
    if !any {
        writeln!(out, "No chats yet. Create one with 'chatdeck chat add --project <id> <name>'.")?;
    }
    Ok(())
}
